//! A single fixed-maximum-size fragment of a stored payload.

use sqlx::FromRow;

/// One row of the `chunks` table as read back for streaming.
#[derive(FromRow, Debug)]
pub struct ChunkRow {
    /// Position of the chunk within its object, starting at 0.
    pub seq: i64,

    /// Raw payload bytes.
    pub data: Vec<u8>,
}
