//! Relay record and state types
//!
//! This module defines the per-relay state stored in the registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::process::{ProcessExit, ProcessHandle};

use super::key::StreamKey;

/// State of a relay record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    /// Record inserted, transcoder not yet launched
    Starting,
    /// Transcoder launched
    Running,
    /// Stop requested, waiting for the transcoder to exit
    Stopping,
    /// Transcoder exited after a requested stop or cleanly
    Stopped,
    /// Transcoder failed to launch, exited abnormally, or never published
    Failed,
}

impl RelayState {
    /// Stopped or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Stopped | RelayState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Starting => "starting",
            RelayState::Running => "running",
            RelayState::Stopping => "stopping",
            RelayState::Stopped => "stopped",
            RelayState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry record for a single relay
///
/// Owns the relay's [`ProcessHandle`]; nothing outside the registry can reach
/// the process.
#[derive(Debug)]
pub struct RelayRecord {
    /// Record ID, unique across the registry's lifetime
    pub id: u64,

    /// Stream key
    pub key: StreamKey,

    /// Input being relayed
    pub source_uri: String,

    /// Where the transcoder publishes
    pub output_uri: String,

    /// Current state
    pub state: RelayState,

    /// Wall-clock start time
    pub started_at: DateTime<Utc>,

    /// Most recent error
    pub last_error: Option<String>,

    /// First probe that found no publisher for this relay (reset when seen)
    pub publisher_missing_since: Option<Instant>,

    /// Supervised transcoder (absent only while starting)
    pub(super) process: Option<ProcessHandle>,
}

impl RelayRecord {
    pub(super) fn starting(id: u64, key: StreamKey, source_uri: String, output_uri: String) -> Self {
        Self {
            id,
            key,
            source_uri,
            output_uri,
            state: RelayState::Starting,
            started_at: Utc::now(),
            last_error: None,
            publisher_missing_since: None,
            process: None,
        }
    }

    /// Attach the launched process and mark the record running
    pub(super) fn attach(&mut self, process: ProcessHandle) {
        self.process = Some(process);
        self.state = RelayState::Running;
    }

    /// Begin stopping
    ///
    /// Returns `false` when the record is already on its way out, including
    /// when its process exited on its own and the exit has not been applied
    /// yet.
    pub(super) fn begin_stop(&mut self, graceful: bool) -> bool {
        if self.process.as_ref().is_some_and(|p| p.has_exited()) {
            return false;
        }

        match self.state {
            RelayState::Running | RelayState::Starting => {
                self.state = RelayState::Stopping;
                if let Some(ref process) = self.process {
                    process.signal_stop(graceful);
                }
                true
            }
            RelayState::Stopping | RelayState::Stopped | RelayState::Failed => false,
        }
    }

    /// Mark the record failed and stop its process
    pub(super) fn fail(&mut self, reason: String) {
        self.state = RelayState::Failed;
        self.last_error = Some(reason);
        if let Some(ref process) = self.process {
            process.signal_stop(true);
        }
    }

    /// Apply a process exit and return the terminal state
    ///
    /// A stop only explains the exit if it was requested before the process
    /// was reaped; otherwise the exit code decides.
    pub(super) fn on_exit(&mut self, exit: &ProcessExit) -> RelayState {
        self.state = match self.state {
            RelayState::Failed => RelayState::Failed,
            RelayState::Stopping if exit.requested => RelayState::Stopped,
            _ if exit.is_success() => RelayState::Stopped,
            _ => {
                self.last_error = Some(exit.describe());
                RelayState::Failed
            }
        };
        self.state
    }

    /// OS process ID of the transcoder
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// Point-in-time copy for readers
    pub fn info(&self) -> RelayInfo {
        RelayInfo {
            id: self.id,
            key: self.key.clone(),
            source_uri: self.source_uri.clone(),
            output_uri: self.output_uri.clone(),
            state: self.state,
            started_at: self.started_at,
            last_error: self.last_error.clone(),
            pid: self.pid(),
        }
    }
}

/// Snapshot of a relay record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInfo {
    pub id: u64,
    pub key: StreamKey,
    pub source_uri: String,
    pub output_uri: String,
    pub state: RelayState,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub pid: Option<u32>,
}

/// An abnormal termination, kept for the list path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNote {
    pub key: StreamKey,
    pub source_uri: String,
    pub error: String,
    pub at: DateTime<Utc>,
}
