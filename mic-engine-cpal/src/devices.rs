//! Input device enumeration for the settings UI.

use cpal::traits::{DeviceTrait, HostTrait};

use mic_engine_core::{DeviceInfo, EngineError};

/// List the input devices the host currently exposes.
///
/// cpal identifies devices by name, so the name doubles as the id the
/// engine's constraints refer to. Devices whose name cannot be read are
/// skipped.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, EngineError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| EngineError::Backend(format!("device enumeration failed: {}", e)))?;

    let mut out = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else {
            continue;
        };
        out.push(DeviceInfo {
            id: name.clone(),
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        });
    }
    Ok(out)
}

/// Resolve a requested device id, falling back to the system default.
pub(crate) fn find_input_device(device_id: Option<&str>) -> Result<cpal::Device, EngineError> {
    let host = cpal::default_host();

    if let Some(id) = device_id {
        let found = host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().map(|n| n == id).unwrap_or(false)));
        match found {
            Some(device) => return Ok(device),
            None => {
                log::warn!("requested device '{}' not found, falling back to default", id);
            }
        }
    }

    host.default_input_device()
        .ok_or_else(|| EngineError::DeviceAcquisition("no input device available".into()))
}
