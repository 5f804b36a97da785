use serde::{Deserialize, Serialize};

use super::constraints::CaptureConstraints;

/// Flat configuration pushed into the engine by the settings/UI layer.
///
/// The engine diffs the device-affecting subset (`selected_mic_id` and the
/// three processing flags) against the constraints currently in effect; a
/// difference there triggers a capture restart, anything else only refreshes
/// the gain policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub ptt_enabled: bool,
    pub noise_gate_threshold_db: f32,
    pub mic_gain: f32,
    pub selected_mic_id: Option<String>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ptt_enabled: false,
            noise_gate_threshold_db: -50.0,
            mic_gain: 1.0,
            selected_mic_id: None,
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
        }
    }
}

impl EngineSettings {
    /// The device-affecting subset of these settings.
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            device_id: self.selected_mic_id.clone(),
            noise_suppression: self.noise_suppression,
            echo_cancellation: self.echo_cancellation,
            auto_gain_control: self.auto_gain_control,
        }
    }

    /// Whether applying these settings requires touching the capture device.
    ///
    /// The device id comparison treats "unspecified" as "keep the current
    /// device", matching the restart contract.
    pub fn requires_restart(&self, current: &CaptureConstraints) -> bool {
        let wanted = self.capture_constraints();
        !current.device_matches(&wanted)
            || current.noise_suppression != wanted.noise_suppression
            || current.echo_cancellation != wanted.echo_cancellation
            || current.auto_gain_control != wanted.auto_gain_control
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let settings = EngineSettings {
            ptt_enabled: true,
            noise_gate_threshold_db: -42.5,
            mic_gain: 1.5,
            selected_mic_id: Some("usb-mic".into()),
            noise_suppression: false,
            echo_cancellation: true,
            auto_gain_control: false,
        };

        let json = serde_json::to_string(&settings).unwrap();
        let back: EngineSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn control_only_change_needs_no_restart() {
        let current = CaptureConstraints::default();
        let settings = EngineSettings {
            noise_gate_threshold_db: -30.0,
            mic_gain: 2.0,
            ptt_enabled: true,
            ..EngineSettings::default()
        };
        assert!(!settings.requires_restart(&current));
    }

    #[test]
    fn processing_flag_change_needs_restart() {
        let current = CaptureConstraints::default();
        let settings = EngineSettings {
            noise_suppression: false,
            ..EngineSettings::default()
        };
        assert!(settings.requires_restart(&current));
    }

    #[test]
    fn unspecified_mic_id_keeps_current_device() {
        let current = CaptureConstraints {
            device_id: Some("usb-mic".into()),
            ..CaptureConstraints::default()
        };
        let settings = EngineSettings::default();
        assert!(!settings.requires_restart(&current));
    }

    #[test]
    fn device_switch_needs_restart() {
        let current = CaptureConstraints {
            device_id: Some("usb-mic".into()),
            ..CaptureConstraints::default()
        };
        let settings = EngineSettings {
            selected_mic_id: Some("headset".into()),
            ..EngineSettings::default()
        };
        assert!(settings.requires_restart(&current));
    }
}
