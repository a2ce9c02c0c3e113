//! Deterministic feature-hashed embedder.
//!
//! Maps tokens into [`EMBEDDING_DIM`] buckets with a signed FNV-1a hash and
//! L2-normalizes the result. No model files, fully deterministic, and good
//! enough for topical similarity: texts sharing vocabulary land in the same
//! buckets with the same signs.

use anyhow::Result;

use super::{EmbeddingProvider, EMBEDDING_DIM};

pub struct HashedEmbedder;

impl EmbeddingProvider for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % EMBEDDING_DIM as u64) as usize;
            // One hash bit decides the sign so collisions partially cancel
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
