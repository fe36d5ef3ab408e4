//! Audio error types.

use overdrive_common::SoundId;
use thiserror::Error;

use crate::engine::EnginePhase;

/// Errors from the audio subsystem.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested sound is not registered in the sound bank.
    #[error("Unknown sound: {0}")]
    UnknownSound(SoundId),

    /// Engine phase transition is not allowed from the current phase.
    #[error("Invalid engine transition from {from:?} to {requested:?}")]
    InvalidTransition {
        /// Phase the engine was in.
        from: EnginePhase,
        /// Phase that was requested.
        requested: EnginePhase,
    },

    /// All spatial source slots are in use.
    #[error("Spatial source pool exhausted ({capacity} slots)")]
    PoolExhausted {
        /// Fixed pool capacity.
        capacity: usize,
    },

    /// Handle refers to a freed or reused source slot.
    #[error("Stale source handle")]
    StaleHandle,

    /// Audio output device could not be initialized.
    #[error("Device initialization failed: {0}")]
    DeviceInit(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
