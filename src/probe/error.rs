//! Probe error types

/// Error querying the streaming server's publisher listing
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// Connection failed or timed out
    #[error("streaming server unreachable: {0}")]
    Unreachable(String),

    /// Non-success HTTP status
    #[error("streaming server returned status {0}")]
    Status(u16),

    /// Response body did not have the expected shape
    #[error("unexpected publisher listing: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProbeError::Decode(err.to_string())
        } else {
            ProbeError::Unreachable(err.to_string())
        }
    }
}
