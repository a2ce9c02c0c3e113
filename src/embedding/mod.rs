//! Text-to-vector embedding capability.
//!
//! Provides the [`EmbeddingProvider`] trait and the built-in
//! [`hashed::HashedEmbedder`]. Providers produce L2-normalized vectors of
//! exactly [`EMBEDDING_DIM`] dimensions; similarity is cosine, clamped to
//! `[0, 1]`. Empty text must embed to the zero vector, and
//! `similarity(zero, zero) = 0` — a thread with no content matches nothing.

pub mod hashed;

use anyhow::Result;

/// Number of dimensions in the embedding vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous — callers in async contexts should use
/// `tokio::task::spawn_blocking`. Implementations backed by a remote model
/// must bound their own latency and return an error on timeout; the engine
/// treats any error as "no usable embedding" and routes heuristically.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector. Empty (or whitespace-only)
    /// text returns the deterministic zero vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Cosine similarity in `[0, 1]`. Zero vectors have similarity 0 to
    /// everything, including each other.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        cosine_similarity(a, b)
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Cosine similarity clamped to `[0, 1]`; 0 if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// The built-in provider: deterministic feature hashing, no model files.
pub fn default_provider() -> Box<dyn EmbeddingProvider> {
    Box::new(hashed::HashedEmbedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn zero_vectors_have_similarity_zero() {
        let zero = vec![0.0f32; 4];
        let v = vec![1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![1.0f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn negative_cosine_clamps_to_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
