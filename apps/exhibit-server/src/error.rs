//! Error types for the exhibit server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exhibit_core::StampError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Could not stamp document: {0}")]
    BadDocument(String),

    #[error("Download not found: {0}")]
    NotFound(String),

    #[error("Processing timeout after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ServerError::BadDocument(msg) => (StatusCode::BAD_REQUEST, "BAD_DOCUMENT", msg.clone()),
            ServerError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("No pending download '{}'", id),
            ),
            ServerError::Timeout(ms) => (
                StatusCode::REQUEST_TIMEOUT,
                "TIMEOUT",
                format!("Processing timeout after {}ms", ms),
            ),
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    msg.clone(),
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StampError> for ServerError {
    fn from(err: StampError) -> Self {
        match err {
            StampError::ParseError(_) | StampError::EmptyDocument => {
                ServerError::BadDocument(err.to_string())
            }
            StampError::InvalidOrder(_) | StampError::InvalidStart(_) => {
                ServerError::InvalidRequest(err.to_string())
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}
