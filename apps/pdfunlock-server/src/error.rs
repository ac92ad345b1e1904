//! Error types for the pdfunlock server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfunlock_core::UnlockError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Archive error: {0}")]
    Archive(String),

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
            ServerError::Archive(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ARCHIVE_ERROR",
                msg.clone(),
            ),
            ServerError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<UnlockError> for ServerError {
    fn from(err: UnlockError) -> Self {
        match err {
            // Batches report per-document failures as outcomes
            UnlockError::Decrypt(err) => ServerError::Internal(err.to_string()),
            UnlockError::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            UnlockError::Archive(msg) => ServerError::Archive(msg),
        }
    }
}

/// Failure of the single-file endpoint: always 400 with `{"error": ...}`.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct RemovePasswordError(pub String);

#[derive(Serialize)]
struct RemovePasswordErrorBody {
    error: String,
}

impl IntoResponse for RemovePasswordError {
    fn into_response(self) -> Response {
        let body = RemovePasswordErrorBody { error: self.0 };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl From<UnlockError> for RemovePasswordError {
    fn from(err: UnlockError) -> Self {
        match err {
            UnlockError::InvalidRequest(msg) => RemovePasswordError(msg),
            other => RemovePasswordError(other.to_string()),
        }
    }
}
