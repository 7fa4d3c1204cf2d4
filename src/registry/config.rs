//! Registry configuration

use std::time::Duration;

use crate::process::TranscoderConfig;

/// Configuration for the relay registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Host (and port) of the streaming server relays publish into
    pub relay_host: String,

    /// Application path segment of the output address
    pub app: String,

    /// How long a gracefully stopped transcoder may take to exit before it
    /// is killed
    pub stop_grace_period: Duration,

    /// How long abnormal terminations are kept for the list path
    pub failure_retention: Duration,

    /// Most abnormal terminations kept at once; the oldest is dropped first
    pub max_failures: usize,

    /// Transcoder invocation settings
    pub transcoder: TranscoderConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            relay_host: "127.0.0.1:1935".to_string(),
            app: "live".to_string(),
            stop_grace_period: Duration::from_secs(5),
            failure_retention: Duration::from_secs(60),
            max_failures: 256,
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the relay host
    pub fn relay_host(mut self, host: impl Into<String>) -> Self {
        self.relay_host = host.into();
        self
    }

    /// Set the application name
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    /// Set the graceful stop period
    pub fn stop_grace_period(mut self, period: Duration) -> Self {
        self.stop_grace_period = period;
        self
    }

    /// Set the failure retention window
    pub fn failure_retention(mut self, retention: Duration) -> Self {
        self.failure_retention = retention;
        self
    }

    /// Set the failure note cap (at least 1)
    pub fn max_failures(mut self, max: usize) -> Self {
        self.max_failures = max.max(1);
        self
    }

    /// Set the transcoder configuration
    pub fn transcoder(mut self, transcoder: TranscoderConfig) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Output address for a stream key: `rtmp://<relay_host>/<app>/<key>`
    pub fn output_uri(&self, key: &str) -> String {
        format!("rtmp://{}/{}/{}", self.relay_host, self.app, key)
    }
}
