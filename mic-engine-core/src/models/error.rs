use thiserror::Error;

/// Errors raised by the microphone engine and its device layer.
///
/// None of these is fatal to the process: the engine always remains in a
/// well-defined state that callers can query via `is_healthy`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(String),

    #[error("replacement source produced no signal within the probe window")]
    ValidationTimeout,

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("constraints not supported: {0}")]
    ConstraintsNotSupported(String),

    #[error("backend error: {0}")]
    Backend(String),
}
