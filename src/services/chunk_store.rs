//! src/services/chunk_store.rs
//!
//! ChunkStore — splits payloads into fixed-size chunks persisted in the
//! `chunks` table under `(object_id, seq)`, and reads them back as a lazy,
//! forward-only stream. It knows nothing about the catalog: a chunk set only
//! becomes reachable once the upload pipeline commits its catalog row.

use super::{StoreError, StoreResult};
use crate::models::chunk::ChunkRow;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, pin_mut, stream::BoxStream};
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// 255 KiB, the largest payload a single chunk row holds by default.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Lazy, ordered sequence of an object's chunk payloads.
pub type ChunkStream = BoxStream<'static, StoreResult<Bytes>>;

/// Outcome of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutSummary {
    pub size: u64,
    pub chunk_count: i64,
    pub md5: String,
}

#[derive(Clone)]
pub struct ChunkStore {
    db: Arc<SqlitePool>,
    chunk_size: usize,
}

/// Read position of a `ChunkStream`.
struct ChunkCursor {
    db: Arc<SqlitePool>,
    object_id: Uuid,
    next_seq: i64,
}

impl ChunkStore {
    pub fn new(db: Arc<SqlitePool>, chunk_size: usize) -> Self {
        Self { db, chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Stream `stream` into chunks of `chunk_size` bytes under `object_id`.
    ///
    /// At most one chunk is buffered at a time. An empty stream still produces
    /// chunk 0 with no payload. On any failure the chunks written so far are
    /// removed best-effort and `StorageWrite` is returned.
    pub async fn put<S>(&self, object_id: Uuid, stream: S) -> StoreResult<PutSummary>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        match self.write_chunks(object_id, stream).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.discard(object_id).await;
                Err(err)
            }
        }
    }

    async fn write_chunks<S>(&self, object_id: Uuid, stream: S) -> StoreResult<PutSummary>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let mut digest = md5::Context::new();
        let mut size: u64 = 0;
        let mut seq: i64 = 0;

        pin_mut!(stream);
        while let Some(piece_res) = stream.next().await {
            let mut piece = piece_res.map_err(|err| StoreError::StorageWrite {
                object_id,
                reason: format!("reading upload body: {}", err),
            })?;
            size += piece.len() as u64;
            digest.consume(&piece);

            while !piece.is_empty() {
                // Whole chunks are written straight from the incoming buffer.
                if buffer.is_empty() && piece.len() >= self.chunk_size {
                    let chunk = piece.split_to(self.chunk_size);
                    self.insert_chunk(object_id, seq, &chunk).await?;
                    seq += 1;
                    continue;
                }

                let take = (self.chunk_size - buffer.len()).min(piece.len());
                buffer.extend_from_slice(&piece.split_to(take));
                if buffer.len() == self.chunk_size {
                    let chunk = buffer.split().freeze();
                    self.insert_chunk(object_id, seq, &chunk).await?;
                    seq += 1;
                }
            }
        }

        if !buffer.is_empty() || seq == 0 {
            let chunk = buffer.split().freeze();
            self.insert_chunk(object_id, seq, &chunk).await?;
            seq += 1;
        }

        debug!(%object_id, size, chunks = seq, "stored all chunks");
        Ok(PutSummary {
            size,
            chunk_count: seq,
            md5: format!("{:x}", digest.compute()),
        })
    }

    async fn insert_chunk(&self, object_id: Uuid, seq: i64, data: &[u8]) -> StoreResult<()> {
        sqlx::query("INSERT INTO chunks (object_id, seq, data) VALUES (?, ?, ?)")
            .bind(object_id)
            .bind(seq)
            .bind(data)
            .execute(&*self.db)
            .await
            .map_err(|err| StoreError::StorageWrite {
                object_id,
                reason: format!("writing chunk {}: {}", seq, err),
            })?;
        Ok(())
    }

    /// Remove every chunk stored under `object_id`. Failures are logged only.
    pub async fn discard(&self, object_id: Uuid) {
        match sqlx::query("DELETE FROM chunks WHERE object_id = ?")
            .bind(object_id)
            .execute(&*self.db)
            .await
        {
            Ok(result) => debug!(
                %object_id,
                removed = result.rows_affected(),
                "discarded chunks of failed upload"
            ),
            Err(err) => warn!(%object_id, "failed to discard chunks: {}", err),
        }
    }

    /// Open the chunks of `object_id` for reading.
    ///
    /// The returned stream fetches one chunk per poll, in ascending sequence
    /// order, and ends with `ChunkSequence` if a sequence number is missing.
    pub async fn get(&self, object_id: Uuid) -> StoreResult<ChunkStream> {
        if !self.exists(object_id).await? {
            return Err(StoreError::ObjectNotFound(object_id));
        }

        let cursor = ChunkCursor {
            db: self.db.clone(),
            object_id,
            next_seq: 0,
        };
        Ok(futures::stream::try_unfold(cursor, next_chunk).boxed())
    }

    /// True if at least one chunk is stored under `object_id`.
    pub async fn exists(&self, object_id: Uuid) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM chunks WHERE object_id = ?)",
        )
        .bind(object_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    /// Number of stored chunks and the highest sequence number, from the
    /// primary key index alone.
    pub async fn chunk_stats(&self, object_id: Uuid) -> StoreResult<(i64, Option<i64>)> {
        let stats = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT COUNT(*), MAX(seq) FROM chunks WHERE object_id = ?",
        )
        .bind(object_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(stats)
    }

    /// Delete chunks that no catalog row refers to.
    ///
    /// Only safe while no upload is in flight, i.e. at startup.
    pub async fn purge_orphans(&self) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM chunks WHERE object_id NOT IN (SELECT id FROM objects)")
                .execute(&*self.db)
                .await?;
        Ok(result.rows_affected())
    }
}

async fn next_chunk(mut cursor: ChunkCursor) -> StoreResult<Option<(Bytes, ChunkCursor)>> {
    let row = sqlx::query_as::<_, ChunkRow>(
        "SELECT seq, data FROM chunks
         WHERE object_id = ? AND seq >= ?
         ORDER BY seq ASC LIMIT 1",
    )
    .bind(cursor.object_id)
    .bind(cursor.next_seq)
    .fetch_optional(&*cursor.db)
    .await?;

    match row {
        None => Ok(None),
        Some(row) if row.seq != cursor.next_seq => {
            error!(
                object_id = %cursor.object_id,
                expected = cursor.next_seq,
                found = row.seq,
                "gap in chunk sequence"
            );
            Err(StoreError::ChunkSequence {
                object_id: cursor.object_id,
                detail: format!("expected chunk {}, found chunk {}", cursor.next_seq, row.seq),
            })
        }
        Some(row) => {
            cursor.next_seq += 1;
            Ok(Some((Bytes::from(row.data), cursor)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{body, chunk_rows, fail_chunk_insert, service};
    use futures::{TryStreamExt, stream};

    async fn read_all(store: &ChunkStore, object_id: Uuid) -> Vec<Bytes> {
        store
            .get(object_id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_splits_into_fixed_chunks_across_piece_boundaries() {
        let (_dir, svc) = service(4).await;
        let id = Uuid::new_v4();

        let summary = svc.chunks.put(id, body(b"abcdefghij", 3)).await.unwrap();
        assert_eq!(summary.size, 10);
        assert_eq!(summary.chunk_count, 3);
        assert_eq!(summary.md5, format!("{:x}", md5::compute(b"abcdefghij")));

        let chunks = read_all(&svc.chunks, id).await;
        assert_eq!(chunks, vec![
            Bytes::from_static(b"abcd"),
            Bytes::from_static(b"efgh"),
            Bytes::from_static(b"ij"),
        ]);
    }

    #[tokio::test]
    async fn oversized_pieces_are_split_without_short_chunks() {
        let (_dir, svc) = service(4).await;
        let id = Uuid::new_v4();

        let summary = svc.chunks.put(id, body(b"0123456789abcdef", 9)).await.unwrap();
        assert_eq!(summary.chunk_count, 4);
        let chunks = read_all(&svc.chunks, id).await;
        assert!(chunks.iter().all(|c| c.len() == 4));
        assert_eq!(chunks.concat(), b"0123456789abcdef");
    }

    #[tokio::test]
    async fn single_large_piece_is_stored_in_bounded_chunks() {
        let (_dir, svc) = service(4).await;
        let id = Uuid::new_v4();
        let payload: Vec<u8> = (0u8..27).collect();

        let summary = svc.chunks.put(id, body(&payload, payload.len())).await.unwrap();
        assert_eq!(summary.chunk_count, 7);
        assert_eq!(summary.size, 27);

        let largest: i64 =
            sqlx::query_scalar("SELECT MAX(length(data)) FROM chunks WHERE object_id = ?")
                .bind(id)
                .fetch_one(&*svc.db)
                .await
                .unwrap();
        assert_eq!(largest, 4);

        let chunks = read_all(&svc.chunks, id).await;
        assert_eq!(chunks.last().map(Bytes::len), Some(3));
        assert_eq!(chunks.concat(), payload);
    }

    #[tokio::test]
    async fn empty_payload_is_one_empty_chunk() {
        let (_dir, svc) = service(4).await;
        let id = Uuid::new_v4();

        let summary = svc.chunks.put(id, body(b"", 1)).await.unwrap();
        assert_eq!(summary.size, 0);
        assert_eq!(summary.chunk_count, 1);
        assert!(svc.chunks.exists(id).await.unwrap());
        assert_eq!(read_all(&svc.chunks, id).await, vec![Bytes::new()]);
    }

    #[tokio::test]
    async fn get_unknown_object_is_not_found() {
        let (_dir, svc) = service(4).await;
        let id = Uuid::new_v4();

        assert!(!svc.chunks.exists(id).await.unwrap());
        assert!(matches!(
            svc.chunks.get(id).await,
            Err(StoreError::ObjectNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn gap_in_sequence_fails_the_read() {
        let (_dir, svc) = service(2).await;
        let id = Uuid::new_v4();
        svc.chunks.put(id, body(b"aabbccdd", 8)).await.unwrap();

        sqlx::query("DELETE FROM chunks WHERE object_id = ? AND seq = 2")
            .bind(id)
            .execute(&*svc.db)
            .await
            .unwrap();

        let mut chunks = svc.chunks.get(id).await.unwrap();
        assert_eq!(chunks.next().await.unwrap().unwrap(), Bytes::from_static(b"aa"));
        assert_eq!(chunks.next().await.unwrap().unwrap(), Bytes::from_static(b"bb"));
        assert!(matches!(
            chunks.next().await,
            Some(Err(StoreError::ChunkSequence { .. }))
        ));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn source_error_discards_written_chunks() {
        let (_dir, svc) = service(2).await;
        let id = Uuid::new_v4();
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"aabb")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let err = svc.chunks.put(id, source).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageWrite { object_id, .. } if object_id == id));
        assert!(!svc.chunks.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn backend_failure_discards_written_chunks() {
        let (_dir, svc) = service(2).await;
        fail_chunk_insert(&svc, 2).await;
        let id = Uuid::new_v4();

        let err = svc.chunks.put(id, body(b"aabbccdd", 3)).await.unwrap_err();
        assert!(err.to_string().contains("writing chunk 2"));
        assert_eq!(chunk_rows(&svc).await, 0);
    }

    #[tokio::test]
    async fn chunk_stats_reads_index_only() {
        let (_dir, svc) = service(3).await;
        let id = Uuid::new_v4();
        svc.chunks.put(id, body(b"1234567", 7)).await.unwrap();

        assert_eq!(svc.chunks.chunk_stats(id).await.unwrap(), (3, Some(2)));
        assert_eq!(svc.chunks.chunk_stats(Uuid::new_v4()).await.unwrap(), (0, None));
    }

    #[tokio::test]
    async fn purge_orphans_removes_uncommitted_chunks() {
        let (_dir, svc) = service(3).await;
        let orphan = Uuid::new_v4();
        svc.chunks.put(orphan, body(b"left behind", 4)).await.unwrap();

        let removed = svc.chunks.purge_orphans().await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(chunk_rows(&svc).await, 0);
    }
}
