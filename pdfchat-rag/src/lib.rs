//! Turn uploaded PDFs into an in-memory vector index.
//!
//! The crate runs three stages in order:
//!
//! 1. **Extraction** ([`TextExtractor`]): concatenate the text of every page
//!    of every uploaded document.
//! 2. **Chunking** ([`Chunker`]): split that text into overlapping windows.
//! 3. **Indexing** ([`EmbeddingProvider`] + [`VectorIndex`]): embed every
//!    chunk and load the vectors into a fresh index.
//!
//! [`RagPipeline`] wires the stages together. Each capability is a trait so
//! the PDF parser, embedding model and index backend can be swapped.
//!
//! # Features
//!
//! - `openai`: [`openai::OpenAIEmbeddingProvider`] for OpenAI-compatible endpoints.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod vectorindex;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{CharacterChunker, Chunker};
pub use config::{ChunkingConfig, ChunkingConfigBuilder};
pub use document::{Chunk, IndexedChunk, PdfDocument, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use extraction::{PdfTextExtractor, TextExtractor};
pub use hashing::HashEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use pipeline::{
    IndexFactory, ProcessOutcome, ProcessStats, RagPipeline, RagPipelineBuilder, Stage,
};
pub use vectorindex::{DistanceMetric, IndexSummary, VectorIndex};
