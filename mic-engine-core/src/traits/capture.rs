use std::sync::Arc;

use crate::models::constraints::{CaptureConstraints, DeviceInfo, TrackSettings};
use crate::models::error::EngineError;

/// Callback invoked when a capture buffer is available.
///
/// Parameters:
/// - `samples`: interleaved f32 samples normalized to [-1, 1].
/// - `sample_rate`: actual rate of the delivered audio.
/// - `channels`: number of interleaved channels.
///
/// The callback fires on a dedicated backend thread — keep processing
/// minimal.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], u32, u16) + Send + Sync + 'static>;

/// A single track inside a capture stream.
pub trait CaptureTrack: Send + Sync {
    /// The values the platform actually negotiated for this track.
    fn settings(&self) -> TrackSettings;

    /// Re-apply non-device properties to the live track without replacing
    /// the stream. A device change is not expressible here; backends reject
    /// it with `ConstraintsNotSupported`.
    fn apply_constraints(&self, constraints: &CaptureConstraints) -> Result<(), EngineError>;

    /// Whether the track is still delivering (device not unplugged/stopped).
    fn is_active(&self) -> bool;

    /// Stop the track and release its device handle. Idempotent.
    fn stop(&self);
}

/// A live capture stream: one or more tracks bound to a device.
pub trait CaptureStream: Send + Sync {
    type Track: CaptureTrack;

    fn tracks(&self) -> &[Self::Track];

    /// At least one track is still live.
    fn is_active(&self) -> bool {
        self.tracks().iter().any(|t| t.is_active())
    }

    /// Stop every track. Idempotent.
    fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Platform capture layer consumed by the engine.
///
/// Implemented by `mic-engine-cpal` in production and by scripted fakes in
/// tests.
pub trait CaptureBackend: Send + Sync + 'static {
    type Stream: CaptureStream + 'static;

    /// Acquire a live stream matching `constraints`, delivering buffers via
    /// `callback`. Blocks until the platform has the stream running or has
    /// refused it.
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        callback: AudioBufferCallback,
    ) -> Result<Self::Stream, EngineError>;

    /// Input devices available for capture, for the settings UI.
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, EngineError>;
}
