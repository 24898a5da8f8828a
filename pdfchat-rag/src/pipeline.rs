//! Extraction → chunking → indexing orchestrator.
//!
//! The [`RagPipeline`] composes a [`TextExtractor`], a [`Chunker`], an
//! [`EmbeddingProvider`] and a factory for fresh [`VectorIndex`] instances.
//! Each call to [`process`](RagPipeline::process) runs the three stages to
//! completion, in order, and returns a brand-new index.
//!
//! # Example
//!
//! ```rust,ignore
//! use pdfchat_rag::{ChunkingConfig, HashEmbeddingProvider, PdfTextExtractor, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .chunking(ChunkingConfig::default())
//!     .extractor(Arc::new(PdfTextExtractor::new()))
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .build()?;
//!
//! let outcome = pipeline.process(documents).await?;
//! println!("{}", outcome.index.summary().await);
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chunking::{CharacterChunker, Chunker, char_len};
use crate::config::ChunkingConfig;
use crate::document::{Chunk, IndexedChunk, PdfDocument};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extraction::TextExtractor;
use crate::inmemory::InMemoryVectorIndex;
use crate::vectorindex::{DistanceMetric, VectorIndex};

/// Creates an empty index for vectors of the given dimensionality and model name.
pub type IndexFactory = Arc<dyn Fn(usize, &str) -> Arc<dyn VectorIndex> + Send + Sync>;

/// The stage a processing request has just entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading text out of the uploaded documents.
    Extracting,
    /// Splitting the text into chunks.
    Chunking,
    /// Embedding chunks and filling the index.
    Indexing,
    /// All stages finished.
    Done,
}

impl Stage {
    /// A progress message for display.
    pub fn message(self) -> &'static str {
        match self {
            Stage::Extracting => "Processing the raw text...",
            Stage::Chunking => "Processing the text chunks...",
            Stage::Indexing => "Creating the vector store...",
            Stage::Done => "Done.",
        }
    }
}

/// Counters describing one processing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessStats {
    /// Number of documents uploaded.
    pub documents: usize,
    /// Characters of extracted text.
    pub characters: usize,
    /// Number of chunks produced.
    pub chunks: usize,
    /// Chunks longer than the configured chunk size.
    pub oversized_chunks: usize,
    /// Wall-clock time for the whole request.
    pub elapsed_ms: u64,
}

/// The result of a processing request.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// The freshly built index.
    pub index: Arc<dyn VectorIndex>,
    /// What went into it.
    pub stats: ProcessStats,
}

/// The pipeline orchestrator. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    chunking: ChunkingConfig,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index_factory: IndexFactory,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("chunking", &self.chunking)
            .field("embedding_provider", &self.embedding_provider.name())
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return the chunking configuration.
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Stage 1: concatenate the text of every page of every document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ExtractionError`] for the first unreadable document.
    pub fn extract_text(&self, documents: &[PdfDocument]) -> Result<String> {
        let text = self.extractor.extract_text(documents).inspect_err(|e| {
            error!(error = %e, "text extraction failed");
        })?;
        info!(document_count = documents.len(), text_len = text.len(), "extracted text");
        Ok(text)
    }

    async fn extract_text_blocking(&self, documents: Vec<PdfDocument>) -> Result<String> {
        let extractor = Arc::clone(&self.extractor);
        let document_count = documents.len();
        let joined = tokio::task::spawn_blocking(move || extractor.extract_text(&documents)).await;

        let text = match joined {
            Ok(result) => result.inspect_err(|e| error!(error = %e, "text extraction failed"))?,
            Err(e) => {
                error!(error = %e, "extraction task did not complete");
                return Err(RagError::PipelineError(format!(
                    "extraction task did not complete: {e}"
                )));
            }
        };
        info!(document_count, text_len = text.len(), "extracted text");
        Ok(text)
    }

    /// Stage 2: split the extracted text into chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let chunks = self.chunker.chunk(text);
        info!(chunk_count = chunks.len(), "chunked text");
        chunks
    }

    /// Stage 3: embed every chunk and load them into a new, empty index.
    ///
    /// An empty chunk list yields an empty index without calling the embedder.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails or returns the
    /// wrong number of vectors, and [`RagError::VectorIndexError`] if insertion fails.
    pub async fn build_index(&self, chunks: Vec<Chunk>) -> Result<Arc<dyn VectorIndex>> {
        let provider = &self.embedding_provider;
        let index = (self.index_factory)(provider.dimensions(), provider.name());
        if chunks.is_empty() {
            info!(chunk_count = 0, "built index (empty)");
            return Ok(index);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(provider = provider.name(), error = %e, "embedding failed");
        })?;

        if embeddings.len() != chunks.len() {
            error!(
                provider = provider.name(),
                expected = chunks.len(),
                actual = embeddings.len(),
                "embedding count mismatch"
            );
            return Err(RagError::EmbeddingError {
                provider: provider.name().to_string(),
                message: format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        let chunk_count = entries.len();

        index.insert(entries).await.inspect_err(|e| {
            error!(error = %e, "index insertion failed");
        })?;

        info!(chunk_count, dimensions = index.dimensions(), "built index");
        Ok(index)
    }

    /// Run extraction, chunking and indexing in order.
    pub async fn process(&self, documents: Vec<PdfDocument>) -> Result<ProcessOutcome> {
        self.process_with_progress(documents, |_| {}).await
    }

    /// Like [`process`](RagPipeline::process), calling `on_stage` as each stage starts
    /// and once more with [`Stage::Done`] on success.
    ///
    /// Extraction runs on the blocking thread pool so a large upload never
    /// occupies an async worker.
    ///
    /// # Errors
    ///
    /// Stage failures keep their own category. [`RagError::PipelineError`] is
    /// returned when the extraction task itself panics or is cancelled.
    pub async fn process_with_progress<F>(
        &self,
        documents: Vec<PdfDocument>,
        mut on_stage: F,
    ) -> Result<ProcessOutcome>
    where
        F: FnMut(Stage) + Send,
    {
        let started = Instant::now();
        let document_count = documents.len();

        on_stage(Stage::Extracting);
        let text = self.extract_text_blocking(documents).await?;
        let characters = char_len(&text);

        on_stage(Stage::Chunking);
        let chunks = self.chunk(&text);
        drop(text);
        let oversized_chunks =
            chunks.iter().filter(|c| char_len(&c.text) > self.chunking.chunk_size).count();
        let chunk_count = chunks.len();

        on_stage(Stage::Indexing);
        let index = self.build_index(chunks).await?;

        let stats = ProcessStats {
            documents: document_count,
            characters,
            chunks: chunk_count,
            oversized_chunks,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            documents = stats.documents,
            characters = stats.characters,
            chunks = stats.chunks,
            oversized_chunks = stats.oversized_chunks,
            elapsed_ms = stats.elapsed_ms,
            "processing complete"
        );
        on_stage(Stage::Done);

        Ok(ProcessOutcome { index, stats })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `chunking`, `extractor` and `embedding_provider` are required. Without an
/// explicit `chunker` a [`CharacterChunker`] is derived from the chunking
/// config; without an `index_factory` each request gets an
/// [`InMemoryVectorIndex`] using `metric`.
#[derive(Default)]
pub struct RagPipelineBuilder {
    chunking: Option<ChunkingConfig>,
    extractor: Option<Arc<dyn TextExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index_factory: Option<IndexFactory>,
    metric: DistanceMetric,
}

impl RagPipelineBuilder {
    /// Set the chunking configuration.
    pub fn chunking(mut self, config: ChunkingConfig) -> Self {
        self.chunking = Some(config);
        self
    }

    /// Set the text extractor.
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the chunker derived from the chunking configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the factory producing a fresh index for every request.
    pub fn index_factory(mut self, factory: IndexFactory) -> Self {
        self.index_factory = Some(factory);
        self
    }

    /// Set the metric used by the default in-memory index.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// chunking configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let chunking = self
            .chunking
            .ok_or_else(|| RagError::ConfigError("chunking config is required".to_string()))?;
        chunking.validate()?;
        let extractor = self
            .extractor
            .ok_or_else(|| RagError::ConfigError("extractor is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let chunker =
            self.chunker.unwrap_or_else(|| Arc::new(CharacterChunker::new(chunking.clone())));
        let metric = self.metric;
        let index_factory = self.index_factory.unwrap_or_else(|| {
            Arc::new(move |dimensions: usize, model: &str| -> Arc<dyn VectorIndex> {
                Arc::new(InMemoryVectorIndex::new(dimensions, model).with_metric(metric))
            })
        });

        Ok(RagPipeline { chunking, extractor, chunker, embedding_provider, index_factory })
    }
}
