//! Process error types

/// Error returned when a transcoder cannot be launched
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The binary does not exist or is not on `PATH`
    #[error("transcoder binary not found: {0}")]
    NotFound(String),

    /// The OS refused to launch the binary
    #[error("failed to launch {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An operand was rejected by the argument template
    #[error("invalid transcoder argument: {0}")]
    InvalidArgument(String),
}

impl SpawnError {
    pub(super) fn from_io(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SpawnError::NotFound(program.to_string())
        } else {
            SpawnError::Io {
                program: program.to_string(),
                source: err,
            }
        }
    }
}
