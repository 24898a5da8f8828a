//! Vector index trait for storing and searching chunk embeddings.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{IndexedChunk, SearchResult};
use crate::error::Result;

/// How distance between two embeddings is measured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Flat L2 distance. Scores are negated distances.
    #[default]
    Euclidean,
    /// Cosine similarity.
    Cosine,
}

impl DistanceMetric {
    /// Score `candidate` against `query`; higher is always more similar.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => -euclidean_distance(query, candidate),
            DistanceMetric::Cosine => cosine_similarity(query, candidate),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => f.write_str("euclidean"),
            DistanceMetric::Cosine => f.write_str("cosine"),
        }
    }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors. Returns 0.0 if either has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A debug rendering of an index, suitable for showing to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSummary {
    /// Unique identifier of this index instance.
    pub id: String,
    /// The backend holding the vectors.
    pub backend: String,
    /// The distance metric used for search.
    pub metric: DistanceMetric,
    /// Dimensionality of the stored vectors.
    pub dimensions: usize,
    /// Number of stored entries.
    pub len: usize,
    /// Name of the embedding model that produced the vectors.
    pub embedding_model: String,
    /// When the index was created.
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} vector index {} ({} entries, dim={}, metric={}, model={})>",
            self.backend, self.id, self.len, self.dimensions, self.metric, self.embedding_model
        )
    }
}

/// A similarity-searchable collection of chunk embeddings.
///
/// Indexes are built once from a full chunk set and never updated
/// incrementally by the pipeline; a new processing request builds a new one.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384, "hash");
/// index.insert(entries).await?;
/// let results = index.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Add entries. Every embedding must match [`dimensions`](VectorIndex::dimensions).
    async fn insert(&self, entries: Vec<IndexedChunk>) -> Result<()>;

    /// Return the `top_k` entries most similar to `embedding`, best first.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored entries.
    async fn len(&self) -> usize;

    /// Whether the index holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dimensionality of the stored vectors.
    fn dimensions(&self) -> usize;

    /// A debug rendering of the index.
    async fn summary(&self) -> IndexSummary;
}
