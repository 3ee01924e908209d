//! Upload pipeline: validate, stream into chunks, then commit the catalog row.
//!
//! `Received → Validated → Streaming → Committed`, or `Failed` from
//! `Streaming` with no catalog row left behind.

use super::{FileService, StoreError, StoreResult};
use crate::models::object::StoredObject;
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::io;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Declared content types accepted regardless of filename.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["text/csv", "video/mp4", "video/mpeg", "video/quicktime"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadPhase {
    Received,
    Validated,
    Streaming,
    Committed,
    Failed,
}

/// Accept when the declared type is allow-listed or the name ends in `.csv`.
///
/// Type parameters such as `; charset=utf-8` are ignored.
pub fn validate_media_type(filename: &str, content_type: Option<&str>) -> StoreResult<()> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());
    let type_allowed = essence
        .as_deref()
        .is_some_and(|ct| ALLOWED_CONTENT_TYPES.contains(&ct));

    if type_allowed || filename.ends_with(".csv") {
        Ok(())
    } else {
        Err(StoreError::UnsupportedMediaType {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
        })
    }
}

impl FileService {
    /// Store `stream` as a new object and return its committed catalog record.
    ///
    /// Rejected uploads never touch storage. Any failure after validation
    /// yields `StorageWrite` and leaves no catalog entry.
    pub async fn upload_stream<S>(
        &self,
        filename: String,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        debug!(%filename, phase = ?UploadPhase::Received, "upload received");
        if let Err(err) = validate_media_type(&filename, content_type.as_deref()) {
            warn!(%filename, content_type = ?content_type, "rejected upload: {}", err);
            return Err(err);
        }

        let object_id = Uuid::new_v4();
        if self.catalog.exists(object_id).await? {
            return Err(StoreError::StorageWrite {
                object_id,
                reason: "generated object id is already in use".into(),
            });
        }
        debug!(%object_id, phase = ?UploadPhase::Validated, "allocated object id");

        debug!(%object_id, phase = ?UploadPhase::Streaming, "streaming chunks");
        let summary = match self.chunks.put(object_id, stream).await {
            Ok(summary) => summary,
            Err(err) => {
                error!(%object_id, phase = ?UploadPhase::Failed, "upload failed: {}", err);
                return Err(err);
            }
        };

        let object = StoredObject {
            id: object_id,
            filename,
            content_type,
            size_bytes: summary.size as i64,
            chunk_size: self.chunks.chunk_size() as i64,
            chunk_count: summary.chunk_count,
            md5: summary.md5,
            created_at: Utc::now(),
        };

        if let Err(err) = self.catalog.commit(&object).await {
            self.chunks.discard(object_id).await;
            error!(%object_id, phase = ?UploadPhase::Failed, "upload failed: {}", err);
            return Err(err);
        }

        info!(
            %object_id,
            filename = %object.filename,
            size = object.size_bytes,
            chunks = object.chunk_count,
            phase = ?UploadPhase::Committed,
            "upload committed"
        );
        Ok(object)
    }
}
