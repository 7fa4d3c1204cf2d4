//! Registry/streaming-server reconciliation

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};

use crate::registry::{RelayRegistry, RelayState, StreamKey};

use super::config::ProbeConfig;
use super::error::ProbeError;
use super::source::PublisherSource;

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Running relays with a live publisher
    pub publishing: Vec<StreamKey>,

    /// Running relays without a publisher, still inside the grace window
    pub awaiting: Vec<StreamKey>,

    /// Relays failed in this cycle for lack of a publisher
    pub failed: Vec<StreamKey>,

    /// Live publishers the registry does not own
    pub orphaned: Vec<String>,
}

impl DriftReport {
    /// Whether registry and streaming server disagreed in any way
    pub fn has_drift(&self) -> bool {
        !self.failed.is_empty() || !self.orphaned.is_empty()
    }
}

/// Last known state of the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// No cycle has completed yet
    Pending,

    /// Last cycle succeeded
    Healthy {
        checked_at: DateTime<Utc>,
        /// Keys with a live publisher
        live: BTreeSet<String>,
        /// Live publishers the registry does not own
        orphaned: Vec<String>,
    },

    /// Last cycle failed; readers fall back to registry-only data
    Unavailable {
        error: String,
        /// Start of the current failure streak
        since: DateTime<Utc>,
    },
}

impl ProbeStatus {
    /// Anything but a successful last cycle
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ProbeStatus::Healthy { .. })
    }
}

/// Periodic cross-check of the registry against the streaming server
pub struct ReconciliationProbe {
    registry: Arc<RelayRegistry>,
    source: Arc<dyn PublisherSource>,
    config: ProbeConfig,
    status: RwLock<ProbeStatus>,
}

impl ReconciliationProbe {
    pub fn new(
        registry: Arc<RelayRegistry>,
        source: Arc<dyn PublisherSource>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            registry,
            source,
            config,
            status: RwLock::new(ProbeStatus::Pending),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Last known status
    pub fn status(&self) -> ProbeStatus {
        self.status.read().clone()
    }

    /// Run one reconciliation cycle
    pub async fn reconcile(&self) -> Result<DriftReport, ProbeError> {
        let listing = match self.source.live_publishers().await {
            Ok(listing) => listing,
            Err(e) => {
                self.mark_unavailable(&e);
                return Err(e);
            }
        };

        Ok(self.apply(&listing, Instant::now()))
    }

    /// Compare a listing against the registry as of `now`
    pub(crate) fn apply(&self, listing: &super::PublisherListing, now: Instant) -> DriftReport {
        let mut report = DriftReport::default();
        let records = self.registry.list();

        for info in records.iter().filter(|r| r.state == RelayState::Running) {
            let publishing = listing.get(info.key.as_str()).copied().unwrap_or(false);

            match self
                .registry
                .observe_publisher(&info.key, info.id, publishing, now)
            {
                None if publishing => report.publishing.push(info.key.clone()),
                None => {}
                Some(missing) if missing > self.config.grace_window => {
                    let reason = format!(
                        "no publisher on the streaming server for {}s",
                        missing.as_secs()
                    );
                    if self.registry.fail(&info.key, info.id, reason) {
                        report.failed.push(info.key.clone());
                    }
                }
                Some(_) => report.awaiting.push(info.key.clone()),
            }
        }

        let live: BTreeSet<String> = listing
            .iter()
            .filter(|(_, publishing)| **publishing)
            .map(|(key, _)| key.clone())
            .collect();

        report.orphaned = live
            .iter()
            .filter(|key| !records.iter().any(|r| r.key.as_str() == key.as_str()))
            .cloned()
            .collect();

        if !report.orphaned.is_empty() {
            tracing::warn!(orphaned = ?report.orphaned, "Live publishers without a relay");
        }
        if report.has_drift() {
            tracing::info!(
                failed = report.failed.len(),
                orphaned = report.orphaned.len(),
                "Reconciliation found drift"
            );
        } else {
            tracing::debug!(
                publishing = report.publishing.len(),
                awaiting = report.awaiting.len(),
                "Reconciliation clean"
            );
        }

        *self.status.write() = ProbeStatus::Healthy {
            checked_at: Utc::now(),
            live,
            orphaned: report.orphaned.clone(),
        };

        report
    }

    fn mark_unavailable(&self, err: &ProbeError) {
        let mut status = self.status.write();
        let since = match &*status {
            ProbeStatus::Unavailable { since, .. } => *since,
            _ => Utc::now(),
        };

        tracing::warn!(error = %err, "Publisher listing unavailable, using registry only");
        *status = ProbeStatus::Unavailable {
            error: err.to_string(),
            since,
        };
    }

    /// Spawn the periodic reconciliation task
    ///
    /// Failed cycles are logged and retried on the next tick. Returns a
    /// handle that can be used to abort the task.
    pub fn spawn_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let probe = Arc::clone(self);
        let interval = probe.config.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Errors are recorded in the probe status
                let _ = probe.reconcile().await;
            }
        })
    }
}
