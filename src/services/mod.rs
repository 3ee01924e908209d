//! Storage services: the chunk store, the object catalog, and the upload and
//! download pipelines that drive them.

pub mod catalog;
pub mod chunk_store;
pub mod download;
pub mod upload;

use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use catalog::Catalog;
use chunk_store::ChunkStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported media type `{}` for `{filename}`", .content_type.as_deref().unwrap_or("<none>"))]
    UnsupportedMediaType {
        filename: String,
        content_type: Option<String>,
    },
    #[error("failed to store object `{object_id}`: {reason}")]
    StorageWrite { object_id: Uuid, reason: String },
    #[error("object `{0}` not found")]
    ObjectNotFound(Uuid),
    #[error("malformed object id `{0}`")]
    InvalidIdentifier(String),
    #[error("chunk sequence fault in object `{object_id}`: {detail}")]
    ChunkSequence { object_id: Uuid, detail: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handler state. Cloning is cheap: every part holds the same pool.
#[derive(Clone)]
pub struct FileService {
    /// Shared SQLite connection pool, also used by the readiness probe.
    pub db: Arc<SqlitePool>,

    pub chunks: ChunkStore,

    pub catalog: Catalog,
}

impl FileService {
    /// Build the service over `db`, splitting new uploads into `chunk_size` byte chunks.
    pub fn new(db: Arc<SqlitePool>, chunk_size: usize) -> Self {
        Self {
            chunks: ChunkStore::new(db.clone(), chunk_size),
            catalog: Catalog::new(db.clone()),
            db,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::FileService;
    use crate::db;
    use bytes::Bytes;
    use futures::{Stream, stream};
    use std::{io, sync::Arc};
    use tempfile::TempDir;

    /// A service over a fresh file-backed database. Keep the `TempDir` alive
    /// for as long as the service is used.
    pub async fn service(chunk_size: usize) -> (TempDir, FileService) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("store.db").display());
        let pool = db::connect(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        (dir, FileService::new(Arc::new(pool), chunk_size))
    }

    /// Feed `data` to a consumer in pieces of `piece` bytes.
    pub fn body(
        data: &[u8],
        piece: usize,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let pieces: Vec<io::Result<Bytes>> = data
            .chunks(piece)
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(pieces)
    }

    /// Install a trigger that makes the backend reject the insert of chunk `seq`.
    pub async fn fail_chunk_insert(service: &FileService, seq: i64) {
        sqlx::query(&format!(
            "CREATE TRIGGER fail_chunk_insert BEFORE INSERT ON chunks WHEN NEW.seq = {seq}
             BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END"
        ))
        .execute(&*service.db)
        .await
        .unwrap();
    }

    pub async fn chunk_rows(service: &FileService) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(&*service.db)
            .await
            .unwrap()
    }
}
