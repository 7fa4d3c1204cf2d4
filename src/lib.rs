//! # stream-relay
//!
//! Control plane for RTSP → RTMP relays. Each relay is one external
//! transcoder process that pulls a source and publishes it into a streaming
//! server under a stream key.
//!
//! ```text
//!   HTTP API ──► RelayController ──► RelayRegistry ──► ProcessHandle ──► ffmpeg
//!                      │                   ▲
//!                      └── list ──►  ReconciliationProbe ──► streaming server
//! ```
//!
//! The registry is the single owner of relay state: at most one relay per
//! key, every spawned process is supervised until it exits, and abnormal
//! exits are retained for the list path. The probe periodically compares the
//! registry against the streaming server's live-publisher listing and fails
//! relays that never manage to publish.
//!
//! ## Embedding
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_relay::controller::{ControllerConfig, RelayController};
//! use stream_relay::probe::{HttpPublisherSource, ProbeConfig, ReconciliationProbe};
//! use stream_relay::registry::RelayRegistry;
//! use stream_relay::server::{ApiServer, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(RelayRegistry::new());
//! let probe_config = ProbeConfig::default();
//! let source = Arc::new(HttpPublisherSource::new(
//!     probe_config.url.clone(),
//!     probe_config.request_timeout,
//! )?);
//! let probe = Arc::new(ReconciliationProbe::new(Arc::clone(&registry), source, probe_config));
//! let controller = Arc::new(RelayController::new(registry, probe, ControllerConfig::default()));
//!
//! ApiServer::new(ServerConfig::default(), controller).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod probe;
pub mod process;
pub mod registry;
pub mod server;

pub use controller::RelayController;
pub use error::{Error, Result};
pub use registry::{RelayRegistry, StreamKey};
