//! Defines routes for the file store.
//!
//! ## Structure
//! - `GET  /`                — list committed files
//! - `POST /upload`          — multipart upload (field `file`), also `/upload/`
//! - `GET  /download/{id}`   — stream a file back as an attachment
//! - `GET  /healthz`, `/readyz` — probes

use crate::{
    handlers::{
        file_handlers::{download_file, list_files, upload_file},
        health_handlers::{healthz, readyz},
    },
    services::FileService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all file store routes.
///
/// Uploads stream into the chunk store, so the default request body limit is
/// lifted for the upload routes.
pub fn routes() -> Router<FileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(list_files))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload/",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/download/{id}", get(download_file))
}
