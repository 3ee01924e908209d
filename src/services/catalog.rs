//! Object catalog — the `objects` table. A row here is what makes a stored
//! chunk set visible to listing and download.

use super::{FileService, StoreError, StoreResult};
use crate::models::object::StoredObject;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const OBJECT_COLUMNS: &str =
    "id, filename, content_type, size_bytes, chunk_size, chunk_count, md5, created_at";

#[derive(Clone)]
pub struct Catalog {
    db: Arc<SqlitePool>,
}

impl Catalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// All committed objects, newest first.
    pub async fn list_all(&self) -> StoreResult<Vec<StoredObject>> {
        let objects = sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(objects)
    }

    pub async fn get(&self, object_id: Uuid) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?"
        ))
        .bind(object_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StoreError::ObjectNotFound(object_id))
    }

    pub async fn exists(&self, object_id: Uuid) -> StoreResult<bool> {
        let found =
            sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM objects WHERE id = ?)")
                .bind(object_id)
                .fetch_one(&*self.db)
                .await?;
        Ok(found != 0)
    }

    /// Make `object` visible. Callers must have stored every chunk first.
    pub async fn commit(&self, object: &StoredObject) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO objects (
                id, filename, content_type, size_bytes, chunk_size, chunk_count, md5, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(&object.filename)
        .bind(&object.content_type)
        .bind(object.size_bytes)
        .bind(object.chunk_size)
        .bind(object.chunk_count)
        .bind(&object.md5)
        .bind(object.created_at)
        .execute(&*self.db)
        .await
        .map_err(|err| StoreError::StorageWrite {
            object_id: object.id,
            reason: if is_unique_violation(&err) {
                "object id already committed".to_string()
            } else {
                format!("committing catalog entry: {}", err)
            },
        })?;
        Ok(())
    }
}

impl FileService {
    /// Listing operation behind `GET /`.
    pub async fn list_files(&self) -> StoreResult<Vec<StoredObject>> {
        self.catalog.list_all().await
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
