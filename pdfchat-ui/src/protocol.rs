//! JSON and SSE payloads exchanged with the browser.

use chrono::{DateTime, Utc};
use pdfchat_rag::{IndexSummary, ProcessStats, RagError, Stage};
use serde::{Deserialize, Serialize};

pub type SessionId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ok: bool,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub ok: bool,
    pub stats: ProcessStats,
    pub index: IndexSummary,
    /// Debug rendering of the index, shown verbatim in the page.
    pub debug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { ok: false, code: code.into(), message: message.into() }
    }
}

impl From<&RagError> for ErrorBody {
    fn from(err: &RagError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// A progress notification streamed to the page while "Process" runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Stage { stage: Stage, message: String, at: DateTime<Utc> },
    Failed { code: String, message: String, at: DateTime<Utc> },
}

impl ProgressEvent {
    pub fn stage(stage: Stage) -> Self {
        Self::Stage { stage, message: stage.message().to_string(), at: Utc::now() }
    }

    pub fn failed(err: &RagError) -> Self {
        Self::Failed { code: err.kind().to_string(), message: err.to_string(), at: Utc::now() }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Failed { .. } => "failed",
        }
    }
}
