//! Live-publisher listing sources
//!
//! The streaming server is the ground truth for whether media is actually
//! flowing. A [`PublisherSource`] returns its current listing as a map of
//! stream key to publisher presence.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::error::ProbeError;

/// Stream key → whether a publisher is connected
pub type PublisherListing = HashMap<String, bool>;

/// Query interface of the streaming server
#[async_trait]
pub trait PublisherSource: Send + Sync {
    /// Fetch the current live-publisher listing
    async fn live_publishers(&self) -> Result<PublisherListing, ProbeError>;
}

/// Publisher listing over HTTP
///
/// Expects the Node-Media-Server `/api/streams` shape:
///
/// ```json
/// { "live": { "cam1": { "publisher": { "clientId": "..." }, "subscribers": [] } } }
/// ```
///
/// A key whose `publisher` is missing or falsy (`null`, `false`, `0`, `""`) is
/// listed as not publishing.
#[derive(Debug, Clone)]
pub struct HttpPublisherSource {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    live: HashMap<String, LiveStream>,
}

#[derive(Debug, Deserialize)]
struct LiveStream {
    #[serde(default)]
    publisher: Option<serde_json::Value>,
}

impl HttpPublisherSource {
    /// Create a source for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PublisherSource for HttpPublisherSource {
    async fn live_publishers(&self) -> Result<PublisherListing, ProbeError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body: StreamsResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::Decode(e.to_string()))?;

        Ok(body
            .live
            .into_iter()
            .map(|(key, stream)| (key, stream.publisher.as_ref().is_some_and(is_truthy)))
            .collect())
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// In-memory listing, set directly by the embedding application or tests
#[derive(Debug, Default)]
pub struct MemoryPublisherSource {
    listing: Mutex<PublisherListing>,
    failure: Mutex<Option<String>>,
}

impl MemoryPublisherSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set publisher presence for a key
    pub fn set(&self, key: impl Into<String>, publishing: bool) {
        self.listing.lock().insert(key.into(), publishing);
    }

    /// Remove a key from the listing
    pub fn remove(&self, key: &str) {
        self.listing.lock().remove(key);
    }

    /// Make every query fail with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<String>) {
        *self.failure.lock() = error;
    }
}

#[async_trait]
impl PublisherSource for MemoryPublisherSource {
    async fn live_publishers(&self) -> Result<PublisherListing, ProbeError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(ProbeError::Unreachable(error));
        }
        Ok(self.listing.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "live": {
                    "cam1": { "publisher": { "clientId": "X1", "app": "live" }, "subscribers": [] },
                    "cam2": { "publisher": null, "subscribers": [{ "clientId": "Y" }] },
                    "cam3": { "subscribers": [] },
                    "cam4": { "publisher": false },
                    "cam5": { "publisher": "" },
                    "cam6": { "publisher": 1 }
                }
            })))
            .mount(&server)
            .await;

        let source =
            HttpPublisherSource::new(format!("{}/api/streams", server.uri()), Duration::from_secs(2))
                .unwrap();
        let listing = source.live_publishers().await.unwrap();

        assert_eq!(listing.len(), 6);
        assert_eq!(listing.get("cam1"), Some(&true));
        assert_eq!(listing.get("cam2"), Some(&false));
        assert_eq!(listing.get("cam3"), Some(&false));
        assert_eq!(listing.get("cam4"), Some(&false));
        assert_eq!(listing.get("cam5"), Some(&false));
        assert_eq!(listing.get("cam6"), Some(&true));
    }

    #[tokio::test]
    async fn test_http_empty_body_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let source = HttpPublisherSource::new(server.uri(), Duration::from_secs(2)).unwrap();

        assert!(source.live_publishers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HttpPublisherSource::new(server.uri(), Duration::from_secs(2)).unwrap();

        assert!(matches!(
            source.live_publishers().await,
            Err(ProbeError::Status(503))
        ));
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "live": {} }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = HttpPublisherSource::new(server.uri(), Duration::from_millis(100)).unwrap();

        assert!(matches!(
            source.live_publishers().await,
            Err(ProbeError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryPublisherSource::new();
        source.set("cam1", true);
        source.set("cam2", false);
        source.remove("cam2");

        let listing = source.live_publishers().await.unwrap();
        assert_eq!(listing.len(), 1);

        source.set_failure(Some("connection refused".to_string()));
        assert!(source.live_publishers().await.is_err());
    }
}
