//! HTTP routes
//!
//! ```text
//! GET  /api/status        service info
//! POST /api/start-stream  {"rtspUrl": "...", "streamKey": "..."}
//! POST /api/stop-stream   {"streamKey": "..."}  (no key stops everything)
//! GET  /api/streams       relay listing
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::controller::{RelayAddressInfo, RelayController, RelayListing, ServiceStatus};

use super::error::{ApiError, ApiResult};

/// Shared handler state
pub type AppState = Arc<RelayController>;

/// Build the API router
pub fn router(controller: Arc<RelayController>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/start-stream", post(start_stream))
        .route("/api/stop-stream", post(stop_stream))
        .route("/api/streams", get(list_streams))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    rtsp_url: Option<String>,
    stream_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest {
    stream_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    message: &'static str,
    public_rtmp: String,
    public_http: String,
    #[serde(flatten)]
    status: ServiceStatus,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    message: String,
    #[serde(flatten)]
    info: RelayAddressInfo,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    message: String,
    ack: bool,
    stopped: usize,
}

#[derive(Debug, Serialize)]
struct StreamsResponse {
    message: &'static str,
    active_streams: Vec<String>,
    #[serde(flatten)]
    listing: RelayListing,
}

/// Parse an optional JSON body; an empty body yields the default value
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

async fn status(State(controller): State<AppState>) -> Json<StatusResponse> {
    let config = controller.config();

    Json(StatusResponse {
        message: "API is running",
        public_rtmp: config.public_rtmp.clone(),
        public_http: config.public_http.clone(),
        status: controller.status(),
    })
}

async fn start_stream(
    State(controller): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StartResponse>> {
    let request: StartRequest = parse_body(&body)?;

    let info = controller.start_relay(request.rtsp_url.as_deref(), request.stream_key.as_deref())?;
    tracing::info!(stream = %info.key, input = %info.input, "Relay started");

    Ok(Json(StartResponse {
        message: format!("Stream {} started", info.key),
        info,
    }))
}

async fn stop_stream(
    State(controller): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StopResponse>> {
    let request: StopRequest = parse_body(&body)?;

    let ack = controller.stop_relay(request.stream_key.as_deref())?;
    let message = match &ack.key {
        Some(key) => format!("Stream {key} stopped"),
        None => format!("All streams stopped ({})", ack.stopped),
    };
    tracing::info!(stopped = ack.stopped, "{}", message);

    Ok(Json(StopResponse {
        message,
        ack: ack.ack,
        stopped: ack.stopped,
    }))
}

async fn list_streams(State(controller): State<AppState>) -> Json<StreamsResponse> {
    let listing = controller.list_relays();

    Json(StreamsResponse {
        message: if listing.degraded {
            "Active streams (registry only)"
        } else {
            "Active streams"
        },
        active_streams: listing.active_keys(),
        listing,
    })
}
