//! Registry error types
//!
//! Error types for relay registry operations.

use crate::process::SpawnError;

use super::key::{StreamKey, MAX_KEY_LEN};

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A record already exists for this key
    #[error("relay already active: {0}")]
    DuplicateKey(StreamKey),

    /// No record exists for this key
    #[error("relay not found: {0}")]
    NotFound(StreamKey),

    /// The transcoder could not be launched; the record was rolled back
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Reasons a string is not a valid [`StreamKey`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidStreamKey {
    #[error("stream key must not be empty")]
    Empty,
    #[error("stream key is {0} bytes long, limit is {limit}", limit = MAX_KEY_LEN)]
    TooLong(usize),
    #[error("stream key contains invalid character {0:?}")]
    InvalidChar(char),
}
