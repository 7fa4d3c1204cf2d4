//! Relay registry implementation
//!
//! The central table of active relays. Mutations are serialized per key by
//! the record lock; the map itself is sharded so unrelated keys never contend
//! on one lock. Lock order is record, then shard: no record is ever locked
//! while a shard guard is held.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::process::{ProcessEvent, ProcessExit, ProcessHandle, TranscoderCommand};

use super::config::RegistryConfig;
use super::entry::{FailureNote, RelayInfo, RelayRecord, RelayState};
use super::error::RegistryError;
use super::key::StreamKey;

type Slot = Arc<Mutex<RelayRecord>>;

struct RetainedFailure {
    note: FailureNote,
    recorded_at: Instant,
    reported: bool,
}

/// Authoritative table of active relays
pub struct RelayRegistry {
    /// Map of stream key to relay record
    relays: DashMap<StreamKey, Slot>,

    /// Abnormal terminations not yet aged out
    failures: Mutex<VecDeque<RetainedFailure>>,

    /// Signalled whenever a record is removed
    removed: Notify,

    next_id: AtomicU64,

    config: RegistryConfig,
}

impl RelayRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            relays: DashMap::new(),
            failures: Mutex::new(VecDeque::new()),
            removed: Notify::new(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start a relay for `key`
    ///
    /// The existence check and the insertion of the `Starting` record are one
    /// atomic step, and the record stays locked until the transcoder has been
    /// launched, so concurrent starts for the same key cannot both spawn. Any
    /// record under `key` blocks a new start until its process has been
    /// reaped.
    ///
    /// On spawn failure the record is rolled back and the key is free again.
    pub fn start(
        self: &Arc<Self>,
        key: StreamKey,
        source_uri: impl Into<String>,
    ) -> Result<RelayInfo, RegistryError> {
        let source_uri = source_uri.into();
        let output_uri = self.config.output_uri(key.as_str());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let slot: Slot = Arc::new(Mutex::new(RelayRecord::starting(
            id,
            key.clone(),
            source_uri.clone(),
            output_uri.clone(),
        )));
        let mut record = slot.lock();

        match self.relays.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(stream = %key, "Start rejected, relay already active");
                return Err(RegistryError::DuplicateKey(key));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&slot));
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let spawned = TranscoderCommand::relay(&self.config.transcoder, &source_uri, &output_uri)
            .and_then(|command| {
                ProcessHandle::spawn(&command, self.config.stop_grace_period, events_tx)
            });

        let process = match spawned {
            Ok(process) => process,
            Err(e) => {
                record.state = RelayState::Failed;
                record.last_error = Some(e.to_string());
                tracing::error!(
                    stream = %key,
                    relay_id = id,
                    error = %e,
                    "Failed to start transcoder"
                );
                self.retain_failure(&record);
                drop(record);

                self.relays.remove_if(&key, |_, v| Arc::ptr_eq(v, &slot));
                self.removed.notify_waiters();
                return Err(RegistryError::Spawn(e));
            }
        };

        tracing::info!(
            stream = %key,
            relay_id = id,
            pid = ?process.pid(),
            source = %source_uri,
            output = %output_uri,
            "Relay started"
        );
        record.attach(process);
        let info = record.info();
        drop(record);

        self.spawn_event_task(key, slot, events_rx);

        Ok(info)
    }

    /// Stop the relay for `key`
    ///
    /// Stopping a relay that is already on its way out is acknowledged
    /// without doing anything. The record stays in the registry until its
    /// process has exited.
    pub fn stop(&self, key: &StreamKey, graceful: bool) -> Result<(), RegistryError> {
        let slot = self
            .slot(key)
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;

        let mut record = slot.lock();
        if record.begin_stop(graceful) {
            tracing::info!(
                stream = %key,
                relay_id = record.id,
                graceful = graceful,
                "Relay stopping"
            );
        } else {
            tracing::debug!(stream = %key, state = %record.state, "Stop already in progress");
        }

        Ok(())
    }

    /// Stop every relay
    ///
    /// Works over a snapshot of the current keys; a key that disappears in the
    /// meantime has already stopped and is skipped. Returns the number of
    /// relays a stop was acknowledged for.
    pub fn stop_all(&self, graceful: bool) -> usize {
        let keys: Vec<StreamKey> = self.relays.iter().map(|r| r.key().clone()).collect();

        let stopped = keys
            .iter()
            .filter(|key| self.stop(key, graceful).is_ok())
            .count();

        tracing::info!(count = stopped, graceful = graceful, "Stopping all relays");
        stopped
    }

    /// Mark the relay failed and stop it
    ///
    /// `id` guards against failing a newer record under the same key. Returns
    /// `false` if no matching running record exists.
    pub fn fail(&self, key: &StreamKey, id: u64, reason: impl Into<String>) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };

        let mut record = slot.lock();
        if record.id != id || record.state != RelayState::Running {
            return false;
        }

        let reason = reason.into();
        tracing::warn!(stream = %key, relay_id = id, reason = %reason, "Relay failed");
        record.fail(reason);
        true
    }

    /// Snapshot of all records
    pub fn list(&self) -> Vec<RelayInfo> {
        self.slots().iter().map(|slot| slot.lock().info()).collect()
    }

    /// Snapshot of one record
    pub fn get(&self, key: &StreamKey) -> Option<RelayInfo> {
        self.slot(key).map(|slot| slot.lock().info())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Abnormal terminations within the retention window
    ///
    /// A failure is reported by at least one call before it can age out,
    /// unless more than `max_failures` newer ones push it out first.
    pub fn recent_failures(&self) -> Vec<FailureNote> {
        let mut failures = self.failures.lock();
        self.prune_failures(&mut failures, Instant::now());

        failures
            .iter_mut()
            .map(|f| {
                f.reported = true;
                f.note.clone()
            })
            .collect()
    }

    /// Record the publisher presence observed by a probe
    ///
    /// Returns how long the relay has been without a publisher, or `None` if
    /// it is publishing, not running, or not the record with `id`.
    pub fn observe_publisher(
        &self,
        key: &StreamKey,
        id: u64,
        publishing: bool,
        now: Instant,
    ) -> Option<Duration> {
        let slot = self.slot(key)?;
        let mut record = slot.lock();

        if record.id != id || record.state != RelayState::Running {
            return None;
        }

        if publishing {
            record.publisher_missing_since = None;
            None
        } else {
            let since = *record.publisher_missing_since.get_or_insert(now);
            Some(now.saturating_duration_since(since))
        }
    }

    /// Wait until the registry is empty, up to `timeout`
    ///
    /// Returns whether the registry drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let removed = self.removed.notified();
            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, removed).await.is_err() {
                return self.is_empty();
            }
        }
    }

    fn slot(&self, key: &StreamKey) -> Option<Slot> {
        self.relays.get(key).map(|r| Arc::clone(r.value()))
    }

    fn slots(&self) -> Vec<Slot> {
        self.relays.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn retain_failure(&self, record: &RelayRecord) {
        let note = FailureNote {
            key: record.key.clone(),
            source_uri: record.source_uri.clone(),
            error: record
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string()),
            at: Utc::now(),
        };

        let now = Instant::now();
        let mut failures = self.failures.lock();
        self.prune_failures(&mut failures, now);

        let cap = self.config.max_failures.max(1);
        while failures.len() >= cap {
            if let Some(dropped) = failures.pop_front() {
                tracing::debug!(
                    stream = %dropped.note.key,
                    reported = dropped.reported,
                    "Failure note dropped, retention cap reached"
                );
            }
        }

        failures.push_back(RetainedFailure {
            note,
            recorded_at: now,
            reported: false,
        });
    }

    /// Drop reported failures older than the retention window
    fn prune_failures(&self, failures: &mut VecDeque<RetainedFailure>, now: Instant) {
        let retention = self.config.failure_retention;
        failures.retain(|f| !(f.reported && now.duration_since(f.recorded_at) > retention));
    }

    /// Consume a relay's process events until it exits
    fn spawn_event_task(
        self: &Arc<Self>,
        key: StreamKey,
        slot: Slot,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ProcessEvent::Started { pid } => {
                        tracing::debug!(stream = %key, pid = ?pid, "Transcoder running");
                    }
                    ProcessEvent::Output { stream, line } => {
                        tracing::debug!(stream = %key, source = stream.as_str(), "{}", line);
                    }
                    ProcessEvent::SpawnFailed(error) => {
                        tracing::debug!(stream = %key, error = %error, "Transcoder spawn failed");
                    }
                    ProcessEvent::Exited(exit) => {
                        registry.remove(&key, &slot, &exit);
                        return;
                    }
                }
            }

            // Supervisor went away without reporting an exit
            let exit = ProcessExit {
                code: None,
                signal: None,
                requested: false,
            };
            registry.remove(&key, &slot, &exit);
        });
    }

    /// Exit callback: move the record to a terminal state and drop it
    fn remove(&self, key: &StreamKey, slot: &Slot, exit: &ProcessExit) {
        let mut record = slot.lock();
        let state = record.on_exit(exit);

        match state {
            RelayState::Failed => {
                tracing::warn!(
                    stream = %key,
                    relay_id = record.id,
                    code = ?exit.code,
                    signal = ?exit.signal,
                    error = record.last_error.as_deref().unwrap_or(""),
                    "Relay failed"
                );
                self.retain_failure(&record);
            }
            _ => {
                tracing::info!(
                    stream = %key,
                    relay_id = record.id,
                    code = ?exit.code,
                    "Relay stopped"
                );
            }
        }
        drop(record);

        self.relays.remove_if(key, |_, v| Arc::ptr_eq(v, slot));
        self.removed.notify_waiters();
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
