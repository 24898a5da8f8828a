//! In-memory vector index with exact search.
//!
//! This module provides [`InMemoryVectorIndex`], a flat index backed by a
//! `Vec` protected by a `tokio::sync::RwLock`. Every search scores every
//! entry, which is fine for the few thousand chunks a handful of PDFs yields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{IndexedChunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorindex::{DistanceMetric, IndexSummary, VectorIndex};

const BACKEND: &str = "InMemory";

/// A flat in-memory vector index.
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    id: String,
    dimensions: usize,
    metric: DistanceMetric,
    embedding_model: String,
    created_at: DateTime<Utc>,
    entries: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index for vectors of `dimensions` components.
    pub fn new(dimensions: usize, embedding_model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            dimensions,
            metric: DistanceMetric::default(),
            embedding_model: embedding_model.into(),
            created_at: Utc::now(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Use `metric` for search instead of the default Euclidean distance.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, entries: Vec<IndexedChunk>) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimensions) {
            return Err(RagError::VectorIndexError {
                backend: BACKEND.to_string(),
                message: format!(
                    "chunk {} has {} dimensions, index expects {}",
                    bad.chunk.index,
                    bad.embedding.len(),
                    self.dimensions
                ),
            });
        }
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if embedding.len() != self.dimensions {
            return Err(RagError::VectorIndexError {
                backend: BACKEND.to_string(),
                message: format!(
                    "query has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dimensions
                ),
            });
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<SearchResult> = entries
            .iter()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: self.metric.score(embedding, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn summary(&self) -> IndexSummary {
        IndexSummary {
            id: self.id.clone(),
            backend: BACKEND.to_string(),
            metric: self.metric,
            dimensions: self.dimensions,
            len: self.len().await,
            embedding_model: self.embedding_model.clone(),
            created_at: self.created_at,
        }
    }
}
