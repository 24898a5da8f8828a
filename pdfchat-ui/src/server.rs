use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use async_stream::stream;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{
        Html, IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use pdfchat_rag::{IndexSummary, PdfDocument, PdfTextExtractor, RagError, RagPipeline};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    protocol::{
        ErrorBody, ProcessResponse, QueryRequest, QueryResponse, SessionCreateResponse,
    },
    session::{SessionManager, SessionState},
};

const UPLOAD_FIELD: &str = "files";
const PDF_MIME: &str = "application/pdf";

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Clone, Debug)]
pub struct AppState {
    pub sessions: SessionManager,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self { sessions: SessionManager::default(), pipeline }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8501 }
    }
}

pub fn app_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/session/{session_id}", delete(delete_session))
        .route("/api/session/{session_id}/query", post(set_query))
        .route("/api/session/{session_id}/process", post(process))
        .route("/api/session/{session_id}/index", get(current_index))
        .route("/api/session/{session_id}/events", get(stream_events))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let provider = config.embedder.build_provider()?;
    let pipeline = RagPipeline::builder()
        .chunking(config.chunking.clone())
        .extractor(Arc::new(PdfTextExtractor::new()))
        .embedding_provider(provider)
        .build()?;
    info!(?pipeline, "pipeline ready");

    let state = AppState::new(Arc::new(pipeline));
    if let Some(max_idle) = config.session_idle_timeout {
        state.sessions.spawn_idle_sweeper(max_idle);
        info!(idle_secs = max_idle.as_secs(), "idle session sweeper started");
    }
    let app = app_router(state, config.max_upload_bytes);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| "invalid host/port for pdfchat-ui server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("pdfchat-ui listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"pdfchat-ui"}))
}

fn session_not_found(session_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("session_not_found", format!("no session '{session_id}'"))),
    )
}

fn rag_error(err: &RagError) -> ApiError {
    let status = match err {
        RagError::ExtractionError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::EmbeddingError { .. } => StatusCode::BAD_GATEWAY,
        RagError::VectorIndexError { .. }
        | RagError::ConfigError(_)
        | RagError::PipelineError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody::from(err)))
}

async fn lookup(state: &AppState, session_id: &str) -> Result<Arc<SessionState>, ApiError> {
    state.sessions.get(session_id).await.ok_or_else(|| session_not_found(session_id))
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.sessions.create_session().await;
    Json(SessionCreateResponse { session_id })
}

async fn delete_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove_session(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(&session_id))
    }
}

async fn set_query(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let session = lookup(&state, &session_id).await?;
    // Stored for the session only; nothing retrieves against it.
    session.set_query(request.query.clone()).await;
    Ok(Json(QueryResponse { ok: true, query: request.query }))
}

fn is_pdf(file_name: &str, content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_MIME))
        || file_name.to_ascii_lowercase().ends_with(".pdf")
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<PdfDocument>, ApiError> {
    let mut documents = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "unreadable upload");
                return Err((e.status(), Json(ErrorBody::new("bad_upload", e.body_text()))));
            }
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        if !is_pdf(&name, field.content_type()) {
            return Err((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(ErrorBody::new("unsupported_media_type", format!("'{name}' is not a PDF"))),
            ));
        }

        let bytes = field.bytes().await.map_err(|e| {
            warn!(document = %name, error = %e, "failed to read upload");
            (e.status(), Json(ErrorBody::new("bad_upload", e.body_text())))
        })?;
        documents.push(PdfDocument::new(name, bytes.to_vec()));
    }
    Ok(documents)
}

async fn process(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let session = lookup(&state, &session_id).await?;
    let documents = read_uploads(multipart).await?;
    info!(session_id = %session_id, document_count = documents.len(), "process requested");

    let outcome = session.process(&state.pipeline, documents).await.map_err(|e| {
        error!(session_id = %session_id, error = %e, "processing failed");
        rag_error(&e)
    })?;

    let index = outcome.index.summary().await;
    Ok(Json(ProcessResponse { ok: true, stats: outcome.stats, debug: index.to_string(), index }))
}

async fn current_index(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<IndexSummary>, ApiError> {
    let session = lookup(&state, &session_id).await?;
    match session.current_index().await {
        Some(index) => Ok(Json(index.summary().await)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("no_index", "no index has been built in this session yet")),
        )),
    }
}

async fn stream_events(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = lookup(&state, &session_id).await?;
    let mut rx = session.subscribe();
    drop(session);

    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().event(event.event_name()).data(data));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    let warn = json!({"warning":"client lagged","skipped": skipped});
                    yield Ok(Event::default().event("log").data(warn.to_string()));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}
