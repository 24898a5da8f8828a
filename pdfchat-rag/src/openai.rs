//! Embeddings from any server speaking the OpenAI `/embeddings` protocol.
//!
//! That covers api.openai.com and self-hosted servers such as HuggingFace
//! text-embeddings-inference. Requires the `openai` feature.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Base URL of the hosted OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used unless [`OpenAIEmbeddingProvider::with_model`] overrides it.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Output size of [`DEFAULT_MODEL`] when no override is requested.
const DEFAULT_MODEL_DIMENSIONS: usize = 1536;

/// Largest number of inputs sent in one request.
const MAX_INPUTS_PER_REQUEST: usize = 256;

const PROVIDER: &str = "OpenAI";

/// Remote [`EmbeddingProvider`] for OpenAI-compatible endpoints.
///
/// Defaults to `text-embedding-3-small` on `https://api.openai.com/v1`.
/// [`with_base_url`](Self::with_base_url) redirects it to another server and
/// [`with_dimensions`](Self::with_dimensions) requests shortened vectors.
///
/// ```rust,ignore
/// use pdfchat_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?
///     .with_base_url("http://localhost:8080/v1");
/// let vectors = provider.embed_batch(&["first chunk", "second chunk"]).await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    output_dimensions: usize,
    dimensions_override: Option<usize>,
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("output_dimensions", &self.output_dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the hosted API using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `api_key` is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            output_dimensions: DEFAULT_MODEL_DIMENSIONS,
            dimensions_override: None,
        })
    }

    /// Create a provider reading the key from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) => Self::new(key),
            Err(_) => Err(RagError::ConfigError("OPENAI_API_KEY is not set".into())),
        }
    }

    /// Use another embedding model, e.g. `text-embedding-3-large`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send requests to another OpenAI-compatible server. A trailing `/` is ignored.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the server for `dims`-component vectors instead of the model's native size.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.output_dimensions = dims;
        self.dimensions_override = Some(dims);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn post_inputs(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = wire::Request {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions_override,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| embedding_error(format!("request to {} failed: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(rejected(status, &raw));
        }

        let mut parsed: wire::Response = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("unreadable response body: {e}")))?;

        if parsed.data.len() != inputs.len() {
            return Err(embedding_error(format!(
                "sent {} inputs but received {} embeddings",
                inputs.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

fn embedding_error(message: impl Into<String>) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.to_string(), message: message.into() }
}

/// Turn a non-2xx reply into an error, preferring the server's own message.
fn rejected(status: StatusCode, raw_body: &str) -> RagError {
    let detail = serde_json::from_str::<wire::ErrorEnvelope>(raw_body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| raw_body.to_string());
    warn!(provider = PROVIDER, %status, detail = %detail, "embedding request rejected");

    if status == StatusCode::TOO_MANY_REQUESTS {
        embedding_error(format!("rate limited: {detail}"))
    } else {
        embedding_error(format!("HTTP {status}: {detail}"))
    }
}

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub(super) struct Request<'a> {
        pub model: &'a str,
        pub input: &'a [&'a str],
        #[serde(skip_serializing_if = "Option::is_none")]
        pub dimensions: Option<usize>,
    }

    #[derive(Deserialize)]
    pub(super) struct Response {
        pub data: Vec<Item>,
    }

    #[derive(Deserialize)]
    pub(super) struct Item {
        #[serde(default)]
        pub index: usize,
        pub embedding: Vec<f32>,
    }

    #[derive(Deserialize)]
    pub(super) struct ErrorEnvelope {
        pub error: ErrorMessage,
    }

    #[derive(Deserialize)]
    pub(super) struct ErrorMessage {
        pub message: String,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.post_inputs(&[text])
            .await?
            .pop()
            .ok_or_else(|| embedding_error("server returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (request_no, inputs) in texts.chunks(MAX_INPUTS_PER_REQUEST).enumerate() {
            debug!(model = %self.model, request_no, inputs = inputs.len(), "requesting embeddings");
            vectors.extend(self.post_inputs(inputs).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.output_dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}
