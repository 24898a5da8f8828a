//! Data types for uploaded documents, chunks, and search results.

use serde::{Deserialize, Serialize};

/// An uploaded PDF, held only for the duration of one processing request.
#[derive(Clone, PartialEq, Eq)]
pub struct PdfDocument {
    /// The file name reported by the uploader.
    pub name: String,
    /// The raw PDF bytes.
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    /// Create a document from a name and its bytes.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }
}

// PDFs run to megabytes; never dump the bytes into logs.
impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A bounded-length segment of the extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position of the chunk in the chunk sequence.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// A [`Chunk`] paired with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// The source chunk.
    pub chunk: Chunk,
    /// The vector embedding for the chunk's text.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
