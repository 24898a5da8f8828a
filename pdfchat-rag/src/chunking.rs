//! Splitting extracted text into overlapping chunks.
//!
//! This module provides the [`Chunker`] trait and [`CharacterChunker`], which
//! splits on a separator and greedily packs the pieces into windows of at most
//! `chunk_size` characters, carrying whole trailing pieces (up to
//! `chunk_overlap` characters) into the next window.

use std::collections::VecDeque;

use tracing::warn;

use crate::config::ChunkingConfig;
use crate::document::Chunk;

/// A strategy for splitting text into chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into an ordered chunk sequence.
    ///
    /// Returns an empty `Vec` if the text has no non-whitespace content.
    fn chunk(&self, text: &str) -> Vec<Chunk>;
}

/// Number of characters (Unicode scalar values) in `text`.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits on a separator, then packs pieces into windows with overlap.
///
/// Lengths are measured in characters. A single piece longer than
/// `chunk_size` is never subdivided: it is emitted as one oversized chunk
/// and a warning is logged.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::{CharacterChunker, ChunkingConfig, Chunker};
///
/// let chunker = CharacterChunker::new(ChunkingConfig::default());
/// let chunks = chunker.chunk(&raw_text);
/// ```
#[derive(Debug, Clone)]
pub struct CharacterChunker {
    config: ChunkingConfig,
}

impl CharacterChunker {
    /// Create a new `CharacterChunker` from a validated configuration.
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Return the configuration this chunker was built with.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` on the configured separator, dropping empty pieces.
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if self.config.separator.is_empty() {
            return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
        }
        text.split(self.config.separator.as_str()).filter(|piece| !piece.is_empty()).collect()
    }

    /// Join a window of pieces with the separator; `None` if nothing but whitespace remains.
    fn join(&self, window: &VecDeque<(&str, usize)>) -> Option<String> {
        let joined =
            window.iter().map(|(piece, _)| *piece).collect::<Vec<_>>().join(&self.config.separator);
        let trimmed = joined.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }

    /// Greedily pack pieces into windows no longer than `chunk_size`.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let chunk_overlap = self.config.chunk_overlap;
        let separator_len = char_len(&self.config.separator);

        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        // Characters in `window`, counting the separators between pieces.
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = |window: &VecDeque<(&str, usize)>| {
                if window.is_empty() { 0 } else { separator_len }
            };

            if total + len + joiner(&window) > chunk_size && !window.is_empty() {
                if let Some(text) = self.join(&window) {
                    merged.push(text);
                }
                while total > chunk_overlap
                    || (total + len + joiner(&window) > chunk_size && total > 0)
                {
                    let joined_len = if window.len() > 1 { separator_len } else { 0 };
                    let Some((_, first_len)) = window.pop_front() else {
                        break;
                    };
                    total -= first_len + joined_len;
                }
            }

            window.push_back((piece, len));
            total += len + if window.len() > 1 { separator_len } else { 0 };
        }

        if let Some(text) = self.join(&window) {
            merged.push(text);
        }
        merged
    }
}

impl Chunker for CharacterChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let pieces = self.split(text);
        let chunks: Vec<Chunk> = self
            .merge(&pieces)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect();

        for chunk in &chunks {
            let len = char_len(&chunk.text);
            if len > self.config.chunk_size {
                warn!(
                    chunk_index = chunk.index,
                    chunk_len = len,
                    chunk_size = self.config.chunk_size,
                    "created a chunk longer than the configured chunk size"
                );
            }
        }

        chunks
    }
}
