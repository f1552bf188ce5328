//! Library error type

use crate::params::Discriminator;
use thiserror::Error;

/// Errors surfaced by the preset manager and the synth handle
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("preset '{0}' not found")]
    PresetNotFound(String),

    #[error("preset '{0}' already exists")]
    PresetExists(String),

    #[error("preset '{preset}' has no {discriminator} container")]
    ContainerNotFound {
        preset: String,
        discriminator: Discriminator,
    },

    #[error("audio engine is no longer running")]
    EngineDisconnected,

    #[error("invalid preset JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SynthResult<T> = std::result::Result<T, SynthError>;
