//! `pdfchat-ui` serves a single page for uploading PDFs and turning them into
//! a per-session vector index. It uses HTTP for actions and SSE for progress.

pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod telemetry;

pub use config::{AppConfig, EmbedderConfig};
pub use server::{AppState, ServerConfig, app_router, run_server};
