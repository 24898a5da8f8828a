//! Error types for the `pdfchat-rag` crate.

use thiserror::Error;

/// Errors that can occur while turning uploaded PDFs into a vector index.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be parsed or its text could not be read.
    #[error("Extraction error ({document}): {message}")]
    ExtractionError {
        /// Name of the uploaded document that failed.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    VectorIndexError {
        /// The vector index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error, including missing credentials.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// A stable machine-readable code for this error category.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::ExtractionError { .. } => "extraction_error",
            RagError::EmbeddingError { .. } => "embedding_error",
            RagError::VectorIndexError { .. } => "vector_index_error",
            RagError::ConfigError(_) => "config_error",
            RagError::PipelineError(_) => "pipeline_error",
        }
    }
}

/// A convenience result type for pdfchat operations.
pub type Result<T> = std::result::Result<T, RagError>;
