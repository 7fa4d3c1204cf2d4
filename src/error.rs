//! Error types
//!
//! Crate-level error taxonomy. Each subsystem has its own error type
//! (`RegistryError`, `SpawnError`) which converts into [`Error`] at the
//! controller boundary. Probe failures never reach callers as errors; they
//! show up as the degraded flag on the relay listing.

use crate::process::SpawnError;
use crate::registry::{RegistryError, StreamKey};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing input, rejected before any state was touched
    #[error("invalid request: {0}")]
    Validation(String),

    /// A relay is already active under this key
    #[error("stream {0} is already running, stop it first")]
    DuplicateKey(StreamKey),

    /// No relay is active under this key
    #[error("stream {0} is not currently running")]
    NotFound(StreamKey),

    /// The transcoder could not be launched
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateKey(key) => Error::DuplicateKey(key),
            RegistryError::NotFound(key) => Error::NotFound(key),
            RegistryError::Spawn(e) => Error::Spawn(e),
        }
    }
}
