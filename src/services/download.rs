//! Download pipeline: parse the id, resolve the catalog record, check the
//! chunk index, then hand the transport a lazy chunk stream.

use super::{FileService, StoreError, StoreResult, chunk_store::ChunkStream};
use crate::models::object::StoredObject;
use futures::StreamExt;
use tracing::{debug, error};
use uuid::Uuid;

/// A resolved download: metadata for the transport headers plus the payload.
pub struct Download {
    pub object: StoredObject,
    pub body: ChunkStream,
}

/// Parse a client-supplied object id.
pub fn parse_object_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::InvalidIdentifier(raw.to_string()))
}

impl FileService {
    /// Resolve `raw_id` to a committed object and open its payload.
    ///
    /// Fails before any byte is produced if the stored chunk set does not match
    /// the catalog. The returned stream also fails if it ends short of, or runs
    /// past, the recorded size.
    pub async fn open_download(&self, raw_id: &str) -> StoreResult<Download> {
        let object_id = parse_object_id(raw_id)?;
        let object = self.catalog.get(object_id).await?;

        let (count, max_seq) = self.chunks.chunk_stats(object_id).await?;
        if count != object.chunk_count || max_seq != Some(object.chunk_count - 1) {
            error!(
                %object_id,
                expected = object.chunk_count,
                stored = count,
                "chunk index does not match catalog"
            );
            return Err(StoreError::ChunkSequence {
                object_id,
                detail: format!(
                    "catalog records {} chunks, store holds {} (max seq {:?})",
                    object.chunk_count, count, max_seq
                ),
            });
        }

        let chunks = self.chunks.get(object_id).await?;
        debug!(%object_id, chunks = count, "opened download");
        Ok(Download {
            body: enforce_length(object_id, object.size_bytes as u64, chunks),
            object,
        })
    }
}

fn enforce_length(object_id: Uuid, expected: u64, chunks: ChunkStream) -> ChunkStream {
    futures::stream::try_unfold((chunks, 0u64), move |(mut chunks, seen)| async move {
        match chunks.next().await {
            Some(Ok(chunk)) => {
                let seen = seen + chunk.len() as u64;
                if seen > expected {
                    return Err(StoreError::ChunkSequence {
                        object_id,
                        detail: format!("payload exceeds recorded size of {} bytes", expected),
                    });
                }
                Ok(Some((chunk, (chunks, seen))))
            }
            Some(Err(err)) => Err(err),
            None if seen == expected => Ok(None),
            None => {
                error!(%object_id, seen, expected, "chunk stream ended early");
                Err(StoreError::ChunkSequence {
                    object_id,
                    detail: format!("payload ended after {} of {} bytes", seen, expected),
                })
            }
        }
    })
    .boxed()
}
