//! Error types surfaced by the HTTP and WebSocket layers.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Message returned whenever a secret does not match.
pub const INVALID_PASSWORD: &str = "Invalid password";

/// Errors that end a request before or after a PM2 invocation.
///
/// A PM2 command that runs and exits non-zero is *not* an `ApiError`; it is
/// reported as a failed [`ExecutionReport`](crate::commands::gateway::ExecutionReport)
/// so the caller can decide what to do with it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong shared secret.
    #[error("Invalid password")]
    Unauthorized,

    /// The command is outside the allowed PM2 command set.
    #[error("{0}")]
    CommandRejected(String),

    /// The listing command could not be run or exited non-zero.
    #[error("{0}")]
    Execution(String),

    /// The listing command printed something that is not a JSON array of objects.
    #[error("Failed to parse process list: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request body was not JSON, or not the expected shape.
    #[error("Invalid request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::CommandRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Execution(_) | ApiError::Parse(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidBody(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}
