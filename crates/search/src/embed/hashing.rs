//! Deterministic feature-hashing embedder
//!
//! Each token is hashed with xxh3 into one of `dimension` buckets with a
//! sign taken from the top hash bit; the result is L2-normalized. Texts
//! sharing vocabulary get high cosine similarity, which is enough for tests
//! and offline use without a model.

use super::Embedder;
use crate::distance::normalize;
use crate::error::EmbedError;
use crate::tokenizer::tokenize;
use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimension` (minimum 1)
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder {
            dimension: dimension.max(1),
        }
    }

    /// Embed one text synchronously
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = xxh3_64(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
