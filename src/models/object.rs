//! Represents a committed file in the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog record for one stored file.
///
/// The struct describes the payload, it does not hold it. Payload bytes live in
/// the `chunks` table under `(id, 0..chunk_count)`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct StoredObject {
    /// Generated at upload time, never reused.
    pub id: Uuid,

    /// Original client-supplied filename. Not used for addressing.
    pub filename: String,

    /// Declared MIME type, if the client sent one.
    pub content_type: Option<String>,

    /// Total payload length in bytes.
    pub size_bytes: i64,

    /// Chunk size the payload was split with.
    pub chunk_size: i64,

    /// Number of chunks, always at least one.
    pub chunk_count: i64,

    /// Hex MD5 of the payload.
    pub md5: String,

    /// When the upload was committed.
    pub created_at: DateTime<Utc>,
}

/// Listing entry returned by `GET /`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<StoredObject> for ObjectSummary {
    fn from(object: StoredObject) -> Self {
        Self {
            id: object.id.to_string(),
            filename: object.filename,
            content_type: object.content_type,
            size: object.size_bytes,
            created_at: object.created_at,
        }
    }
}
