//! Probe configuration

use std::time::Duration;

/// Configuration for the reconciliation probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Whether the periodic probe runs at all
    pub enabled: bool,

    /// Publisher listing endpoint of the streaming server
    pub url: String,

    /// Time between reconciliation cycles
    pub interval: Duration,

    /// Per-request timeout for the listing query
    pub request_timeout: Duration,

    /// How long a running relay may go without a publisher before it is
    /// failed
    pub grace_window: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://127.0.0.1:8000/api/streams".to_string(),
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            grace_window: Duration::from_secs(15),
        }
    }
}

impl ProbeConfig {
    /// Set the listing endpoint
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the reconciliation interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the grace window
    pub fn grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    /// Disable the periodic probe
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
