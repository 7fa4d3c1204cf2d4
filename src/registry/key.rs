//! Stream key type
//!
//! A stream key identifies one relay. It is used as the registry map key and
//! as the last path segment of the relay's output address, so only a
//! conservative character set is accepted.

use std::borrow::Borrow;

use super::error::InvalidStreamKey;

/// Maximum stream key length in bytes
pub const MAX_KEY_LEN: usize = 128;

/// Unique identifier for a relay (e.g., "cam1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey(String);

impl StreamKey {
    /// Create a new stream key
    ///
    /// Accepts ASCII alphanumerics, `-`, `_` and `.`; must be non-empty and at
    /// most [`MAX_KEY_LEN`] bytes. A key made only of dots is rejected since it
    /// would be a relative path segment.
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidStreamKey> {
        let key = key.into();

        if key.is_empty() {
            return Err(InvalidStreamKey::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(InvalidStreamKey::TooLong(key.len()));
        }
        if let Some(c) = key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(InvalidStreamKey::InvalidChar(c));
        }
        if key.chars().all(|c| c == '.') {
            return Err(InvalidStreamKey::InvalidChar('.'));
        }

        Ok(Self(key))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for StreamKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl TryFrom<&str> for StreamKey {
    type Error = InvalidStreamKey;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
