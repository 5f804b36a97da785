use serde::{Deserialize, Serialize};

/// Requested properties for a capture device stream.
///
/// `device_id: None` means "whatever the platform considers the default
/// input". The three processing flags are forwarded to the platform's
/// capture stack; the engine itself performs no DSP beyond metering and
/// gain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub device_id: Option<String>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
        }
    }
}

impl CaptureConstraints {
    /// True when `requested` targets the same device as this set: an exact
    /// id match, or no id requested at all.
    pub fn device_matches(&self, requested: &CaptureConstraints) -> bool {
        match (&self.device_id, &requested.device_id) {
            (_, None) => true,
            (Some(current), Some(wanted)) => current == wanted,
            (None, Some(_)) => false,
        }
    }

    /// Merge a same-device reconfiguration into the current constraints.
    ///
    /// The device id is kept when the request leaves it unspecified, so a
    /// later diff still knows which device is in use.
    pub fn merged_in_place(&self, requested: &CaptureConstraints) -> CaptureConstraints {
        CaptureConstraints {
            device_id: requested
                .device_id
                .clone()
                .or_else(|| self.device_id.clone()),
            ..requested.clone()
        }
    }
}

/// Negotiated values reported by a live capture track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSettings {
    pub device_id: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

/// An input device available for capture, as shown in the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_device(id: Option<&str>) -> CaptureConstraints {
        CaptureConstraints {
            device_id: id.map(String::from),
            ..CaptureConstraints::default()
        }
    }

    #[test]
    fn unspecified_request_matches_any_device() {
        assert!(with_device(Some("usb-mic")).device_matches(&with_device(None)));
        assert!(with_device(None).device_matches(&with_device(None)));
    }

    #[test]
    fn exact_id_match() {
        assert!(with_device(Some("usb-mic")).device_matches(&with_device(Some("usb-mic"))));
        assert!(!with_device(Some("usb-mic")).device_matches(&with_device(Some("headset"))));
    }

    #[test]
    fn specific_request_against_default_is_a_change() {
        assert!(!with_device(None).device_matches(&with_device(Some("usb-mic"))));
    }

    #[test]
    fn merge_keeps_device_id_when_unspecified() {
        let current = with_device(Some("usb-mic"));
        let requested = CaptureConstraints {
            device_id: None,
            noise_suppression: false,
            ..CaptureConstraints::default()
        };

        let merged = current.merged_in_place(&requested);
        assert_eq!(merged.device_id.as_deref(), Some("usb-mic"));
        assert!(!merged.noise_suppression);
    }
}
