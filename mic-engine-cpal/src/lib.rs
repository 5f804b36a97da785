//! # mic-engine-cpal
//!
//! cpal capture backend for mic-engine.
//!
//! Provides:
//! - `CpalBackend` — microphone acquisition implementing the core's
//!   `CaptureBackend` trait
//! - `devices` — input device enumeration for the settings UI
//!
//! ## Usage
//! ```ignore
//! use mic_engine_core::{CaptureConstraints, MicEngine};
//! use mic_engine_cpal::CpalBackend;
//!
//! let engine = MicEngine::new(CpalBackend::new());
//! engine.set_input(&CaptureConstraints::default())?;
//! let outbound = engine.processed_stream();
//! ```

pub mod backend;
pub mod devices;

pub use backend::{CpalBackend, CpalStream, CpalTrack};
pub use devices::list_input_devices;
