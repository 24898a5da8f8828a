//! Application configuration, read from the environment.

use std::sync::Arc;
use std::time::Duration;

use pdfchat_rag::{ChunkingConfig, EmbeddingProvider, HashEmbeddingProvider, RagError, Result};

use crate::server::ServerConfig;
use crate::telemetry::LogFormat;

const MIB: usize = 1024 * 1024;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 60;

/// Which embedding backend to use, with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderConfig {
    /// Offline feature-hashing embeddings.
    Hash { dimensions: usize },
    /// An OpenAI-compatible `/embeddings` endpoint.
    OpenAi {
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        dimensions: Option<usize>,
    },
}

impl EmbedderConfig {
    /// Construct the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the provider cannot be built, for
    /// example when OpenAI support was compiled out.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            EmbedderConfig::Hash { dimensions } => {
                Ok(Arc::new(HashEmbeddingProvider::new(*dimensions)?))
            }
            #[cfg(feature = "openai")]
            EmbedderConfig::OpenAi { api_key, model, base_url, dimensions } => {
                let mut provider = pdfchat_rag::openai::OpenAIEmbeddingProvider::new(api_key.clone())?;
                if let Some(model) = model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(base_url) = base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                if let Some(dimensions) = dimensions {
                    provider = provider.with_dimensions(*dimensions);
                }
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "openai"))]
            EmbedderConfig::OpenAi { .. } => Err(RagError::ConfigError(
                "this build has no OpenAI support; enable the `openai` feature".to_string(),
            )),
        }
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub max_upload_bytes: usize,
    /// Sessions unused this long are dropped. `None` keeps them until DELETE.
    pub session_idle_timeout: Option<Duration>,
    pub chunking: ChunkingConfig,
    pub embedder: EmbedderConfig,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = ServerConfig::default();
        let chunk_defaults = ChunkingConfig::default();

        let server = ServerConfig {
            host: get("PDFCHAT_HOST").unwrap_or(defaults.host),
            port: parse(&get, "PDFCHAT_PORT")?.unwrap_or(defaults.port),
        };
        let max_upload_mb: usize = parse(&get, "PDFCHAT_MAX_UPLOAD_MB")?.unwrap_or(200);
        let idle_minutes: u64 = parse(&get, "PDFCHAT_SESSION_IDLE_MINUTES")?
            .unwrap_or(DEFAULT_SESSION_IDLE_MINUTES);
        let session_idle_timeout =
            (idle_minutes > 0).then(|| Duration::from_secs(idle_minutes.saturating_mul(60)));

        let chunking = ChunkingConfig::builder()
            .separator(
                lookup("PDFCHAT_CHUNK_SEPARATOR")
                    .map(|s| unescape(&s))
                    .unwrap_or(chunk_defaults.separator),
            )
            .chunk_size(parse(&get, "PDFCHAT_CHUNK_SIZE")?.unwrap_or(chunk_defaults.chunk_size))
            .chunk_overlap(
                parse(&get, "PDFCHAT_CHUNK_OVERLAP")?.unwrap_or(chunk_defaults.chunk_overlap),
            )
            .build()?;

        let dimensions: Option<usize> = parse(&get, "PDFCHAT_EMBEDDING_DIMENSIONS")?;
        let embedder = match get("PDFCHAT_EMBEDDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("hash") => EmbedderConfig::Hash {
                dimensions: dimensions.unwrap_or(HashEmbeddingProvider::DEFAULT_DIMENSIONS),
            },
            Some("openai") => EmbedderConfig::OpenAi {
                api_key: get("OPENAI_API_KEY").ok_or_else(|| {
                    RagError::ConfigError(
                        "OPENAI_API_KEY must be set when PDFCHAT_EMBEDDER=openai".to_string(),
                    )
                })?,
                model: get("PDFCHAT_EMBEDDING_MODEL"),
                base_url: get("PDFCHAT_EMBEDDING_BASE_URL"),
                dimensions,
            },
            Some(other) => {
                return Err(RagError::ConfigError(format!(
                    "unknown PDFCHAT_EMBEDDER '{other}' (expected 'hash' or 'openai')"
                )));
            }
        };

        let log_format = match get("PDFCHAT_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(RagError::ConfigError(format!(
                    "unknown PDFCHAT_LOG_FORMAT '{other}' (expected 'text' or 'json')"
                )));
            }
        };

        Ok(Self {
            server,
            max_upload_bytes: max_upload_mb.saturating_mul(MIB),
            session_idle_timeout,
            chunking,
            embedder,
            log_format,
        })
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| RagError::ConfigError(format!("invalid {key} '{raw}': {e}")))
        })
        .transpose()
}

/// Expand `\n`, `\t`, `\r` and `\\` escapes so separators can be written in `.env` files.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
