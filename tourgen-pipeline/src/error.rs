//! Error types for tourgen-pipeline
//!
//! Adapter and tier failures are absorbed as confidence degradation; only the
//! variants here ever reach a pipeline caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Pipeline failure surfaced to the caller
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No strategy, not even the regional default, produced a coordinate (fatal)
    #[error("Resolution exhausted for {query:?}: {reason}")]
    ResolutionExhausted { query: String, reason: String },
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pipeline failure (422)
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Pipeline(err @ PipelineError::ResolutionExhausted { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "RESOLUTION_EXHAUSTED",
                err.to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
