//! HTTP control API
//!
//! Thin axum layer over [`RelayController`](crate::controller::RelayController).
//! Request bodies use the camelCase field names that existing dashboard
//! clients send (`rtspUrl`, `streamKey`); responses are snake_case JSON.

pub mod config;
pub mod error;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use listener::ApiServer;
pub use routes::router;
