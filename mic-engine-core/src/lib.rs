//! # mic-engine-core
//!
//! Platform-agnostic live-microphone engine for a voice-chat client.
//!
//! Continuously acquires audio through a pluggable capture backend, shapes
//! gain with two mutually-exclusive talk policies (push-to-talk and a noise
//! gate), detects speaking edges for external ducking, and supervises the
//! capture device with a watchdog that escalates from restart to rollback
//! on sustained unexpected silence.
//!
//! ## Architecture
//!
//! ```text
//! mic-engine-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureStream, CaptureTrack
//! ├── models/       ← EngineError, ControlState, CaptureConstraints, EngineSettings
//! ├── processing/   ← AnalysisWindow, GainRamp, ProcessedStream
//! └── engine/       ← MicEngine orchestrator, watchdog, signal validator,
//!                     listener registries, periodic scheduler
//! ```
//!
//! Platform backends (e.g. `mic-engine-cpal`) implement `CaptureBackend`
//! and plug into the generic `MicEngine`.

pub mod engine;
pub mod models;
pub mod processing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use engine::listeners::{LevelCallback, ListenerHandle, SpeakingCallback};
pub use engine::mic_engine::{MicEngine, ANALYSIS_TICK_PERIOD, VALIDATION_TIMEOUT};
pub use engine::scheduler::PeriodicTask;
pub use engine::validator::SignalValidator;
pub use engine::watchdog::{RESTART_AFTER, ROLLBACK_AFTER, WATCHDOG_PERIOD};
pub use models::constraints::{CaptureConstraints, DeviceInfo, TrackSettings};
pub use models::error::EngineError;
pub use models::settings::EngineSettings;
pub use models::state::{ControlState, GateDecision};
pub use processing::analysis_window::AnalysisWindow;
pub use processing::gain_ramp::GainRamp;
pub use processing::output::{ProcessedStream, StreamFormat};
pub use traits::capture::{AudioBufferCallback, CaptureBackend, CaptureStream, CaptureTrack};
