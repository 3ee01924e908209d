//! HTTP handlers for listing, uploading, and downloading files.
//! Upload bodies are streamed straight into the chunk store and downloads are
//! streamed chunk by chunk, so neither side buffers a whole file.

use crate::{
    errors::AppError,
    models::object::{ObjectSummary, StoredObject},
    services::FileService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use futures::StreamExt;
use serde::Serialize;
use std::io;

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub id: String,
}

/// `GET /` — every committed file.
pub async fn list_files(
    State(service): State<FileService>,
) -> Result<Json<Vec<ObjectSummary>>, AppError> {
    let files = service.list_files().await?;
    Ok(Json(files.into_iter().map(ObjectSummary::from).collect()))
}

/// `POST /upload` — store the multipart `file` field.
pub async fn upload_file(
    State(service): State<FileService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        tracing::warn!("Failed to read multipart field: {}", err);
        AppError::bad_request("Failed to read upload")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));

        let object = service
            .upload_stream(filename, content_type, stream)
            .await?;

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".into(),
            id: object.id.to_string(),
        }));
    }

    tracing::warn!("No file field found in multipart upload");
    Err(AppError::bad_request("No file provided. Use field name 'file'"))
}

/// `GET /download/{id}` — stream a stored file as an attachment.
pub async fn download_file(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let download = service.open_download(&id).await?;

    let mut response = Response::new(Body::from_stream(download.body));
    set_download_headers(response.headers_mut(), &download.object);
    Ok(response)
}

fn set_download_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&meta.filename));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.md5)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// `attachment; filename="..."`, with an RFC 5987 `filename*` when the name
/// has characters that cannot sit in a quoted ASCII string.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut value = format!("attachment; filename=\"{}\"", fallback);
    if fallback != filename {
        value.push_str(&format!("; filename*=UTF-8''{}", urlencoding::encode(filename)));
    }
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
