//! Process lifecycle events

/// Which pipe an output line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// How a supervised process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed (unix only)
    pub signal: Option<i32>,
    /// Whether termination had been requested via `signal_stop`
    pub requested: bool,
}

impl ProcessExit {
    /// Exit code 0
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human-readable description of the exit
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("transcoder exited with code {code}"),
            (None, Some(signal)) => format!("transcoder killed by signal {signal}"),
            (None, None) => "transcoder exited with unknown status".to_string(),
        }
    }
}

/// Events emitted by a [`ProcessHandle`](super::ProcessHandle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Process launched
    Started { pid: Option<u32> },

    /// One line of output (informational)
    Output { stream: OutputStream, line: String },

    /// Process terminated and was reaped
    Exited(ProcessExit),

    /// Process could not be launched
    SpawnFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_exit() {
        let clean = ProcessExit {
            code: Some(0),
            signal: None,
            requested: false,
        };
        assert!(clean.is_success());
        assert_eq!(clean.describe(), "transcoder exited with code 0");

        let killed = ProcessExit {
            code: None,
            signal: Some(9),
            requested: true,
        };
        assert!(!killed.is_success());
        assert_eq!(killed.describe(), "transcoder killed by signal 9");
    }
}
