//! cpal capture backend.
//!
//! Acquires a microphone stream through cpal and delivers f32 buffers via
//! the engine's `AudioBufferCallback`. cpal streams are not `Send`, so each
//! acquired stream lives on a dedicated capture thread controlled through a
//! run flag; `stop` flips the flag and joins the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use mic_engine_core::{
    AudioBufferCallback, CaptureBackend, CaptureConstraints, CaptureStream, CaptureTrack,
    DeviceInfo, EngineError, TrackSettings,
};

use crate::devices;

/// How long `acquire` waits for the capture thread to report the stream
/// running or refused.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval of the capture thread's park loop after the stream starts.
const PARK_INTERVAL: Duration = Duration::from_millis(50);

/// Microphone capture backend backed by the host's default cpal host.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for CpalBackend {
    type Stream = CpalStream;

    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        callback: AudioBufferCallback,
    ) -> Result<CpalStream, EngineError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded(1);

        let thread_constraints = constraints.clone();
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || {
                capture_thread(thread_constraints, callback, thread_running, ready_tx);
            })
            .map_err(|e| EngineError::Backend(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(ACQUIRE_TIMEOUT) {
            Ok(Ok(settings)) => Ok(CpalStream {
                tracks: vec![CpalTrack::new(settings, running, Some(handle))],
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(EngineError::DeviceAcquisition(
                    "timed out waiting for the capture stream to start".into(),
                ))
            }
        }
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        devices::list_input_devices()
    }
}

/// A live cpal capture stream. Single audio track.
pub struct CpalStream {
    tracks: Vec<CpalTrack>,
}

impl CaptureStream for CpalStream {
    type Track = CpalTrack;

    fn tracks(&self) -> &[CpalTrack] {
        &self.tracks
    }
}

/// The one track of a cpal stream.
pub struct CpalTrack {
    settings: Mutex<TrackSettings>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalTrack {
    fn new(
        settings: TrackSettings,
        running: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    ) -> Self {
        Self {
            settings: Mutex::new(settings),
            running,
            handle: Mutex::new(handle),
        }
    }
}

impl CaptureTrack for CpalTrack {
    fn settings(&self) -> TrackSettings {
        self.settings.lock().clone()
    }

    fn apply_constraints(&self, constraints: &CaptureConstraints) -> Result<(), EngineError> {
        let mut settings = self.settings.lock();

        if let Some(id) = &constraints.device_id {
            if *id != settings.device_id {
                return Err(EngineError::ConstraintsNotSupported(format!(
                    "cannot retarget a live track to device '{}'",
                    id
                )));
            }
        }

        // cpal exposes no DSP toggles; the processing flags are recorded as
        // the requested state and the platform capture stack owns the
        // actual behavior.
        settings.noise_suppression = constraints.noise_suppression;
        settings.echo_cancellation = constraints.echo_cancellation;
        settings.auto_gain_control = constraints.auto_gain_control;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture thread body: build and play the stream, report the negotiated
/// settings, then park until stopped. The stream is dropped (and capture
/// released) when the loop exits.
fn capture_thread(
    constraints: CaptureConstraints,
    callback: AudioBufferCallback,
    running: Arc<AtomicBool>,
    ready_tx: Sender<Result<TrackSettings, EngineError>>,
) {
    let built = build_input_stream(&constraints, callback, Arc::clone(&running));
    match built {
        Ok((stream, settings)) => {
            if let Err(e) = stream.play() {
                running.store(false, Ordering::SeqCst);
                let _ = ready_tx.send(Err(EngineError::DeviceAcquisition(format!(
                    "failed to start stream: {}",
                    e
                ))));
                return;
            }
            log::info!(
                "capture running on '{}' ({} Hz, {} ch)",
                settings.device_id,
                settings.sample_rate,
                settings.channels
            );
            let _ = ready_tx.send(Ok(settings));

            while running.load(Ordering::SeqCst) {
                thread::sleep(PARK_INTERVAL);
            }
            drop(stream);
            log::debug!("capture thread stopped");
        }
        Err(e) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_input_stream(
    constraints: &CaptureConstraints,
    callback: AudioBufferCallback,
    running: Arc<AtomicBool>,
) -> Result<(cpal::Stream, TrackSettings), EngineError> {
    let device = devices::find_input_device(constraints.device_id.as_deref())?;
    let device_name = device
        .name()
        .map_err(|e| EngineError::DeviceAcquisition(format!("unreadable device name: {}", e)))?;

    let config = device
        .default_input_config()
        .map_err(|e| EngineError::DeviceAcquisition(format!("no input config: {}", e)))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels();
    let settings = TrackSettings {
        device_id: device_name,
        sample_rate,
        channels,
        noise_suppression: constraints.noise_suppression,
        echo_cancellation: constraints.echo_cancellation,
        auto_gain_control: constraints.auto_gain_control,
    };

    // A stream error marks the track inactive so the engine's health check
    // and watchdog can react.
    let err_running = Arc::clone(&running);
    let err_fn = move |err: cpal::StreamError| {
        log::error!("capture stream error: {}", err);
        err_running.store(false, Ordering::SeqCst);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                callback(data, sample_rate, channels);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> =
                    data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                callback(&samples, sample_rate, channels);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.into(),
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                    .collect();
                callback(&samples, sample_rate, channels);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(EngineError::ConstraintsNotSupported(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| EngineError::DeviceAcquisition(format!("failed to build input stream: {}", e)))?;

    Ok((stream, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> CpalTrack {
        CpalTrack::new(
            TrackSettings {
                device_id: "usb-mic".into(),
                sample_rate: 48_000,
                channels: 1,
                noise_suppression: true,
                echo_cancellation: true,
                auto_gain_control: true,
            },
            Arc::new(AtomicBool::new(true)),
            None,
        )
    }

    #[test]
    fn apply_constraints_records_processing_flags() {
        let track = track();
        let requested = CaptureConstraints {
            device_id: Some("usb-mic".into()),
            noise_suppression: false,
            echo_cancellation: false,
            auto_gain_control: true,
        };

        track.apply_constraints(&requested).unwrap();

        let settings = track.settings();
        assert!(!settings.noise_suppression);
        assert!(!settings.echo_cancellation);
        assert!(settings.auto_gain_control);
    }

    #[test]
    fn apply_constraints_rejects_device_retarget() {
        let track = track();
        let requested = CaptureConstraints {
            device_id: Some("headset".into()),
            ..CaptureConstraints::default()
        };

        let err = track.apply_constraints(&requested).unwrap_err();
        assert!(matches!(err, EngineError::ConstraintsNotSupported(_)));
    }

    #[test]
    fn unspecified_device_keeps_current_track() {
        let track = track();
        let requested = CaptureConstraints {
            device_id: None,
            noise_suppression: false,
            ..CaptureConstraints::default()
        };

        track.apply_constraints(&requested).unwrap();
        assert_eq!(track.settings().device_id, "usb-mic");
    }

    #[test]
    fn stop_marks_track_inactive() {
        let track = track();
        assert!(track.is_active());
        track.stop();
        assert!(!track.is_active());
        track.stop();
    }
}
