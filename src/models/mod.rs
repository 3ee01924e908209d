//! Core data models for the chunked file store.
//!
//! `StoredObject` maps to the `objects` catalog table and `ChunkRow` to the
//! `chunks` table, both via `sqlx::FromRow`.

pub mod chunk;
pub mod object;
