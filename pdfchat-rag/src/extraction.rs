//! Text extraction from uploaded PDF documents.
//!
//! [`TextExtractor`] is the seam to the PDF parsing library. The default
//! adapter, [`PdfTextExtractor`], is backed by the `pdf-extract` crate.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::document::PdfDocument;
use crate::error::{RagError, Result};

/// A backend that turns a binary document into per-page text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text of every page of `document`, in page order.
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<String>>;

    /// Extract and concatenate the text of every page of every document.
    ///
    /// Pages and documents are joined in input order with no separator.
    /// The first document that fails aborts the whole call.
    fn extract_text(&self, documents: &[PdfDocument]) -> Result<String> {
        let mut text = String::new();
        for document in documents {
            let pages = self.extract_pages(document)?;
            let before = text.len();
            for page in &pages {
                text.push_str(page);
            }
            debug!(
                document = %document.name,
                page_count = pages.len(),
                text_len = text.len() - before,
                "extracted document text"
            );
        }
        Ok(text)
    }
}

/// The default [`TextExtractor`], backed by `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<String>> {
        let bytes = document.bytes.as_slice();
        // The parser panics on some malformed inputs instead of returning an error.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }));

        match outcome {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => {
                error!(document = %document.name, error = %e, "pdf extraction failed");
                Err(RagError::ExtractionError {
                    document: document.name.clone(),
                    message: e.to_string(),
                })
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "parser panicked".to_string());
                error!(document = %document.name, error = %message, "pdf parser panicked");
                Err(RagError::ExtractionError { document: document.name.clone(), message })
            }
        }
    }
}
