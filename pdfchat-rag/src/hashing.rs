//! Deterministic, offline embeddings via feature hashing.
//!
//! [`HashEmbeddingProvider`] needs no model download and no credentials.
//! Word tokens and character trigrams are hashed into a fixed number of
//! signed buckets and the result is L2-normalised, so texts sharing
//! vocabulary land close together and identical texts always produce
//! identical vectors.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// 64-bit FNV-1a. Stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// A feature-hashing [`EmbeddingProvider`].
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Default vector size, matching common small sentence-embedding models.
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Create a provider producing vectors of `dimensions` components.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let word = word.to_lowercase();
            self.add_feature(&mut vector, &word, WORD_WEIGHT);

            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: Self::DEFAULT_DIMENSIONS }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    /// Hashing runs on the blocking thread pool.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let provider = self.clone();
        let texts: Vec<String> = texts.iter().map(|text| (*text).to_string()).collect();
        tokio::task::spawn_blocking(move || {
            texts.iter().map(|text| provider.embed_sync(text)).collect()
        })
        .await
        .map_err(|e| RagError::EmbeddingError {
            provider: "hash".to_string(),
            message: format!("embedding task did not complete: {e}"),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn same_text_same_vector() {
        let provider = HashEmbeddingProvider::new(64).unwrap();
        let a = provider.embed("The quick brown fox").await.unwrap();
        let b = provider.embed("The quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let provider = HashEmbeddingProvider::default();
        let v = provider.embed("portable document format").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_is_the_zero_vector() {
        let provider = HashEmbeddingProvider::new(16).unwrap();
        let v = provider.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let provider = HashEmbeddingProvider::default();
        let query = provider.embed("rust ownership and borrowing").await.unwrap();
        let near = provider.embed("Borrowing rules in Rust ownership").await.unwrap();
        let far = provider.embed("baking sourdough bread at home").await.unwrap();
        assert!(dot(&query, &near) > dot(&query, &far));
    }

    #[tokio::test]
    async fn batch_matches_single() {
        let provider = HashEmbeddingProvider::new(32).unwrap();
        let batch = provider.embed_batch(&["alpha", "beta"]).await.unwrap();
        assert_eq!(batch[0], provider.embed("alpha").await.unwrap());
        assert_eq!(batch[1], provider.embed("beta").await.unwrap());
    }

    #[test]
    fn zero_dimensions_is_a_config_error() {
        assert!(matches!(HashEmbeddingProvider::new(0), Err(RagError::ConfigError(_))));
    }
}
