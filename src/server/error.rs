//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Error with an HTTP status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(_) => ApiError::bad_request(err.to_string()),
            Error::DuplicateKey(_) => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            Error::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            Error::Spawn(e) => {
                tracing::error!(error = %e, "Failed to start transcoder");
                ApiError::internal(format!("failed to start transcoder: {e}"))
            }
            Error::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::internal("internal server error")
            }
            Error::Io(e) => {
                tracing::error!(error = %e, "I/O error");
                ApiError::internal("internal server error")
            }
        }
    }
}
