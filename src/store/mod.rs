//! SQLite-backed persistence for threads and bridges.
//!
//! One row per entity, status listings served by indexed queries, and every
//! multi-row mutation wrapped in a transaction so a crash mid-write never
//! leaves a half-written record. Corrupt rows are logged and skipped by
//! readers — "entity not found", never a panic.

pub mod bridges;
pub mod threads;

/// Convert an f32 embedding slice to raw little-endian bytes for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert raw bytes back to an f32 embedding.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
