//! Request-facing relay control
//!
//! The controller validates caller input, applies defaults, and translates
//! registry outcomes into the crate error taxonomy. It never touches a
//! transcoder process directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::probe::{ProbeStatus, ReconciliationProbe};
use crate::registry::{RelayRegistry, RelayState, StreamKey};

/// URI schemes accepted as relay sources
const SOURCE_SCHEMES: &[&str] = &[
    "rtsp", "rtsps", "rtmp", "rtmps", "http", "https", "srt", "udp", "tcp",
];

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Key used when a start request names none
    pub default_key: String,

    /// Externally reachable RTMP host:port of the streaming server
    pub public_rtmp: String,

    /// Externally reachable HTTP-FLV host:port of the streaming server
    pub public_http: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_key: "stream".to_string(),
            public_rtmp: "127.0.0.1:1935".to_string(),
            public_http: "127.0.0.1:8000".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Set the default stream key
    pub fn default_key(mut self, key: impl Into<String>) -> Self {
        self.default_key = key.into();
        self
    }

    /// Set the public RTMP address
    pub fn public_rtmp(mut self, addr: impl Into<String>) -> Self {
        self.public_rtmp = addr.into();
        self
    }

    /// Set the public HTTP-FLV address
    pub fn public_http(mut self, addr: impl Into<String>) -> Self {
        self.public_http = addr.into();
        self
    }
}

/// Addresses of a started relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayAddressInfo {
    pub key: StreamKey,
    /// Source being relayed
    pub input: String,
    /// Address the transcoder publishes to
    pub output: String,
    /// Playback address over RTMP
    pub rtmp_url: String,
    /// Playback address over HTTP-FLV
    pub http_flv_url: String,
}

/// Acknowledgement of a stop request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopAck {
    pub ack: bool,
    /// Key for a single stop, `None` for a bulk stop
    pub key: Option<StreamKey>,
    /// Relays a stop was acknowledged for
    pub stopped: usize,
}

/// One row of the relay listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayEntry {
    pub key: StreamKey,
    pub state: RelayState,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Publisher presence from the last good probe cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

/// Relay listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayListing {
    pub entries: Vec<RelayEntry>,
    /// Live publishers the registry does not own
    pub orphaned: Vec<String>,
    /// The listing is registry-only because the probe has no good data
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

impl RelayListing {
    /// Keys of relays that are not in a terminal state
    pub fn active_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.state.is_terminal())
            .map(|e| e.key.to_string())
            .collect()
    }
}

/// Service status summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub relays: usize,
    pub probe: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

/// Start/stop/list orchestration
pub struct RelayController {
    registry: Arc<RelayRegistry>,
    probe: Arc<ReconciliationProbe>,
    config: ControllerConfig,
}

impl RelayController {
    pub fn new(
        registry: Arc<RelayRegistry>,
        probe: Arc<ReconciliationProbe>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    pub fn probe(&self) -> &Arc<ReconciliationProbe> {
        &self.probe
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Start relaying `source` under `key` (or the default key)
    ///
    /// Success means the registry accepted control of the relay, not that
    /// media is flowing; that shows up later in the listing.
    pub fn start_relay(&self, source: Option<&str>, key: Option<&str>) -> Result<RelayAddressInfo> {
        let source = validate_source(source)?;
        let key = self.resolve_key(key)?;

        let info = self.registry.start(key.clone(), source.clone())?;
        let app = &self.registry.config().app;

        Ok(RelayAddressInfo {
            rtmp_url: format!("rtmp://{}/{}/{}", self.config.public_rtmp, app, key),
            http_flv_url: format!("http://{}/{}/{}.flv", self.config.public_http, app, key),
            key,
            input: source,
            output: info.output_uri,
        })
    }

    /// Stop the relay under `key`, or every relay when `key` is `None`
    pub fn stop_relay(&self, key: Option<&str>) -> Result<StopAck> {
        match key {
            Some(key) => {
                let key = StreamKey::new(key).map_err(|e| Error::Validation(e.to_string()))?;
                self.registry.stop(&key, true)?;
                Ok(StopAck {
                    ack: true,
                    key: Some(key),
                    stopped: 1,
                })
            }
            None => {
                let stopped = self.registry.stop_all(true);
                Ok(StopAck {
                    ack: true,
                    key: None,
                    stopped,
                })
            }
        }
    }

    /// Current relays, cross-checked with the last good probe cycle
    ///
    /// Recent abnormal terminations are included as `Failed` entries.
    pub fn list_relays(&self) -> RelayListing {
        let status = self.probe.status();
        let degraded = status.is_degraded();
        let (live, orphaned, probe_error) = match status {
            ProbeStatus::Healthy { live, orphaned, .. } => (Some(live), orphaned, None),
            ProbeStatus::Unavailable { error, .. } => (None, Vec::new(), Some(error)),
            ProbeStatus::Pending => (None, Vec::new(), None),
        };

        let mut entries: Vec<RelayEntry> = self
            .registry
            .list()
            .into_iter()
            .map(|info| RelayEntry {
                publishing: live.as_ref().map(|l| l.contains(info.key.as_str())),
                key: info.key,
                state: info.state,
                source: info.source_uri,
                output: Some(info.output_uri),
                started_at: Some(info.started_at),
                error: info.last_error,
                failed_at: None,
            })
            .collect();

        entries.extend(
            self.registry
                .recent_failures()
                .into_iter()
                .map(|note| RelayEntry {
                    key: note.key,
                    state: RelayState::Failed,
                    source: note.source_uri,
                    output: None,
                    started_at: None,
                    publishing: None,
                    error: Some(note.error),
                    failed_at: Some(note.at),
                }),
        );
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        RelayListing {
            entries,
            orphaned,
            degraded,
            probe_error,
        }
    }

    /// Status summary
    pub fn status(&self) -> ServiceStatus {
        let (probe, probe_checked_at, probe_error) = match self.probe.status() {
            ProbeStatus::Pending => ("pending", None, None),
            ProbeStatus::Healthy { checked_at, .. } => ("healthy", Some(checked_at), None),
            ProbeStatus::Unavailable { error, .. } => ("unavailable", None, Some(error)),
        };

        ServiceStatus {
            relays: self.registry.len(),
            probe,
            probe_checked_at,
            probe_error,
        }
    }

    /// Stop every relay and wait up to `timeout` for them to exit
    ///
    /// Returns whether the registry drained in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let stopped = self.registry.stop_all(true);
        if stopped > 0 {
            tracing::info!(count = stopped, "Waiting for relays to exit");
        }

        let drained = self.registry.wait_idle(timeout).await;
        if !drained {
            tracing::warn!(
                remaining = self.registry.len(),
                "Relays still running at shutdown deadline"
            );
        }
        drained
    }

    fn resolve_key(&self, key: Option<&str>) -> Result<StreamKey> {
        let key = match key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => self.config.default_key.as_str(),
        };

        StreamKey::new(key).map_err(|e| Error::Validation(e.to_string()))
    }
}

fn validate_source(source: Option<&str>) -> Result<String> {
    let source = source
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("missing rtspUrl in request body".to_string()))?;

    let url = url::Url::parse(source)
        .map_err(|e| Error::Validation(format!("invalid source url: {e}")))?;

    if !SOURCE_SCHEMES.contains(&url.scheme()) {
        return Err(Error::Validation(format!(
            "unsupported source scheme: {}",
            url.scheme()
        )));
    }
    if !url.has_host() {
        return Err(Error::Validation("source url has no host".to_string()));
    }

    Ok(source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MemoryPublisherSource, ProbeConfig, PublisherSource};
    use crate::registry::store::tests::missing_binary_registry;

    fn controller_with(registry: Arc<RelayRegistry>) -> (RelayController, Arc<MemoryPublisherSource>) {
        let source = Arc::new(MemoryPublisherSource::new());
        let probe = Arc::new(ReconciliationProbe::new(
            Arc::clone(&registry),
            Arc::clone(&source) as Arc<dyn PublisherSource>,
            ProbeConfig::default(),
        ));
        let config = ControllerConfig::default()
            .public_rtmp("media.example.com:1935")
            .public_http("media.example.com:8000");
        (RelayController::new(registry, probe, config), source)
    }

    #[test]
    fn test_validate_source() {
        assert!(validate_source(Some("rtsp://cam1/stream")).is_ok());
        assert!(validate_source(Some("  rtsp://user:pw@10.0.0.5:554/h264  ")).is_ok());
        assert!(matches!(validate_source(None), Err(Error::Validation(_))));
        assert!(matches!(validate_source(Some("  ")), Err(Error::Validation(_))));
        assert!(matches!(
            validate_source(Some("not a url")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_source(Some("file:///etc/passwd")),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_start_validation_does_not_touch_registry() {
        let (controller, _) = controller_with(Arc::new(RelayRegistry::new()));

        let missing = controller.start_relay(None, Some("cam1"));
        assert!(matches!(missing, Err(Error::Validation(_))));

        let bad_key = controller.start_relay(Some("rtsp://cam1/stream"), Some("../etc"));
        assert!(matches!(bad_key, Err(Error::Validation(_))));

        assert!(controller.registry().is_empty());
        assert!(controller.list_relays().entries.is_empty());
    }

    #[tokio::test]
    async fn test_stop_nonexistent() {
        let (controller, _) = controller_with(Arc::new(RelayRegistry::new()));

        let result = controller.stop_relay(Some("nonexistent"));

        assert!(matches!(result, Err(Error::NotFound(ref k)) if k.as_str() == "nonexistent"));
    }

    #[tokio::test]
    async fn test_bulk_stop_with_nothing_running() {
        let (controller, _) = controller_with(Arc::new(RelayRegistry::new()));

        let ack = tokio_test::assert_ok!(controller.stop_relay(None));

        assert!(ack.ack);
        assert_eq!(ack.key, None);
        assert_eq!(ack.stopped, 0);
    }

    #[tokio::test]
    async fn test_missing_binary_scenario() {
        let (controller, _) = controller_with(missing_binary_registry());

        let result = controller.start_relay(Some("rtsp://cam1/stream"), Some("cam1"));
        assert!(matches!(result, Err(Error::Spawn(_))));

        let listing = controller.list_relays();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].key.as_str(), "cam1");
        assert_eq!(listing.entries[0].state, RelayState::Failed);
        assert!(listing.entries[0].error.is_some());
        assert!(listing.active_keys().is_empty());

        // Immediately reusable: fails on spawn again, not as a duplicate
        let again = controller.start_relay(Some("rtsp://cam1/stream"), Some("cam1"));
        assert!(matches!(again, Err(Error::Spawn(_))));
    }

    #[tokio::test]
    async fn test_listing_degraded_when_probe_unavailable() {
        let (controller, source) = controller_with(Arc::new(RelayRegistry::new()));
        assert!(controller.list_relays().degraded);

        source.set("ghost", true);
        controller.probe().reconcile().await.unwrap();
        let listing = controller.list_relays();
        assert!(!listing.degraded);
        assert_eq!(listing.orphaned, ["ghost"]);

        source.set_failure(Some("connection refused".to_string()));
        assert!(controller.probe().reconcile().await.is_err());
        let listing = controller.list_relays();
        assert!(listing.degraded);
        assert!(listing.orphaned.is_empty());
        assert!(listing.probe_error.unwrap().contains("connection refused"));
        assert_eq!(controller.status().probe, "unavailable");
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::registry::store::tests::sleeper_registry;

        #[tokio::test]
        async fn test_cam1_scenario() {
            let (registry, _dir) = sleeper_registry();
            let (controller, source) = controller_with(registry);

            let info = controller
                .start_relay(Some("rtsp://cam1/stream"), Some("cam1"))
                .unwrap();
            assert_eq!(info.output, "rtmp://127.0.0.1:1935/live/cam1");
            assert_eq!(info.rtmp_url, "rtmp://media.example.com:1935/live/cam1");
            assert_eq!(info.http_flv_url, "http://media.example.com:8000/live/cam1.flv");

            let dup = controller.start_relay(Some("rtsp://cam1/stream"), Some("cam1"));
            assert!(matches!(dup, Err(Error::DuplicateKey(_))));

            source.set("cam1", true);
            controller.probe().reconcile().await.unwrap();
            let listing = controller.list_relays();
            assert_eq!(listing.active_keys(), ["cam1"]);
            assert_eq!(listing.entries[0].publishing, Some(true));

            let ack = controller.stop_relay(Some("cam1")).unwrap();
            assert!(ack.ack);

            assert!(controller.registry().wait_idle(Duration::from_secs(5)).await);
            let listing = controller.list_relays();
            assert!(listing.entries.iter().all(|e| e.key.as_str() != "cam1"));
        }

        #[tokio::test]
        async fn test_default_key() {
            let (registry, _dir) = sleeper_registry();
            let (controller, _) = controller_with(registry);

            let info = controller.start_relay(Some("rtsp://cam/1"), None).unwrap();
            assert_eq!(info.key.as_str(), "stream");

            let err = controller.start_relay(Some("rtsp://cam/2"), Some("  ")).unwrap_err();
            assert!(matches!(err, Error::DuplicateKey(_)));

            assert!(controller.shutdown(Duration::from_secs(5)).await);
        }

        #[tokio::test]
        async fn test_shutdown_stops_everything() {
            let (registry, _dir) = sleeper_registry();
            let (controller, _) = controller_with(registry);

            for key in ["a", "b", "c"] {
                controller.start_relay(Some("rtsp://cam/1"), Some(key)).unwrap();
            }
            assert_eq!(controller.status().relays, 3);

            assert!(controller.shutdown(Duration::from_secs(5)).await);
            assert_eq!(controller.status().relays, 0);
            assert!(controller.list_relays().entries.is_empty());
        }
    }
}
