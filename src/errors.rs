use crate::services::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Client-facing message for both unknown and malformed ids.
pub const NOT_FOUND_MESSAGE: &str = "File not found or invalid ID";

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Backend details are logged here and never copied into the response.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnsupportedMediaType { .. } => {
                AppError::bad_request("Only CSV and Video files are allowed.")
            }
            StoreError::InvalidIdentifier(raw) => {
                tracing::warn!("malformed object id {:?}", raw);
                AppError::not_found(NOT_FOUND_MESSAGE)
            }
            StoreError::ObjectNotFound(id) => {
                tracing::warn!("object {} not found", id);
                AppError::not_found(NOT_FOUND_MESSAGE)
            }
            err @ StoreError::StorageWrite { .. } => {
                tracing::error!("{}", err);
                AppError::internal("Failed to store file")
            }
            err @ StoreError::ChunkSequence { .. } => {
                tracing::error!("{}", err);
                AppError::internal("Stored file is incomplete or corrupted")
            }
            StoreError::Sqlx(err) => {
                tracing::error!("storage backend error: {}", err);
                AppError::internal("Storage backend error")
            }
        }
    }
}
