use std::{sync::Arc, time::Duration};

use pdfchat_rag::{
    ChunkingConfig, HashEmbeddingProvider, PdfDocument, PdfTextExtractor, RagError, RagPipeline,
    TextExtractor,
};
use pdfchat_ui::{AppState, app_router};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

const MAX_UPLOAD: usize = 10 * 1024 * 1024;

/// Treats upload bytes as already-extracted UTF-8 so tests don't need real PDFs.
struct Utf8Extractor;

impl TextExtractor for Utf8Extractor {
    fn extract_pages(&self, document: &PdfDocument) -> pdfchat_rag::Result<Vec<String>> {
        String::from_utf8(document.bytes.clone()).map(|s| vec![s]).map_err(|e| {
            RagError::ExtractionError { document: document.name.clone(), message: e.to_string() }
        })
    }
}

fn pipeline_with(extractor: Arc<dyn TextExtractor>) -> RagPipeline {
    RagPipeline::builder()
        .chunking(ChunkingConfig::default())
        .extractor(extractor)
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(32).expect("provider")))
        .build()
        .expect("pipeline")
}

async fn spawn_server_with(pipeline: RagPipeline) -> (String, tokio::task::JoinHandle<()>) {
    let app = app_router(AppState::new(Arc::new(pipeline)), MAX_UPLOAD);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    spawn_server_with(pipeline_with(Arc::new(Utf8Extractor))).await
}

async fn create_session(client: &reqwest::Client, base: &str) -> String {
    let created: Value = client
        .post(format!("{}/api/session", base))
        .send()
        .await
        .expect("session create response")
        .json()
        .await
        .expect("session json");
    created
        .get("session_id")
        .and_then(Value::as_str)
        .expect("session_id field")
        .to_string()
}

fn pdf_form(files: &[(&str, &str, &[u8])]) -> Form {
    files.iter().fold(Form::new(), |form, (name, mime, bytes)| {
        let part = Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str(mime)
            .expect("mime");
        form.part("files", part)
    })
}

async fn post_process(
    client: &reqwest::Client,
    base: &str,
    session_id: &str,
    form: Form,
) -> reqwest::Response {
    client
        .post(format!("{}/api/session/{}/process", base, session_id))
        .multipart(form)
        .send()
        .await
        .expect("process response")
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, handle) = spawn_server().await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("health response")
        .json()
        .await
        .expect("health json");
    assert_eq!(body["status"], "ok");

    handle.abort();
}

#[tokio::test]
async fn index_page_is_served() {
    let (base, handle) = spawn_server().await;

    let page = reqwest::get(format!("{}/", base))
        .await
        .expect("page response")
        .text()
        .await
        .expect("page body");
    assert!(page.contains("AI PDF Chat App"));
    assert!(page.contains("Your Documents"));

    handle.abort();
}

#[tokio::test]
async fn process_single_pdf_builds_one_chunk_index() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let form = pdf_form(&[("hello.pdf", "application/pdf", b"Hello world\nThis is a test.")]);
    let response = post_process(&client, &base, &session_id, form).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.expect("process json");
    assert_eq!(body["ok"], true);
    assert_eq!(body["stats"]["documents"], 1);
    assert_eq!(body["stats"]["chunks"], 1);
    assert_eq!(body["index"]["len"], 1);
    assert_eq!(body["index"]["dimensions"], 32);
    assert!(body["debug"].as_str().unwrap_or_default().contains("1 entries"));

    let index = client
        .get(format!("{}/api/session/{}/index", base, session_id))
        .send()
        .await
        .expect("index response");
    assert_eq!(index.status(), reqwest::StatusCode::OK);
    let summary: Value = index.json().await.expect("index json");
    assert_eq!(summary["id"], body["index"]["id"]);

    handle.abort();
}

#[tokio::test]
async fn processing_nothing_yields_empty_index() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    // A stray non-file field keeps the multipart body well-formed.
    let form = Form::new().text("note", "no documents");
    let response = post_process(&client, &base, &session_id, form).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.expect("process json");
    assert_eq!(body["stats"]["documents"], 0);
    assert_eq!(body["stats"]["chunks"], 0);
    assert_eq!(body["index"]["len"], 0);

    handle.abort();
}

#[tokio::test]
async fn second_process_replaces_the_index() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let first: Value = post_process(
        &client,
        &base,
        &session_id,
        pdf_form(&[("a.pdf", "application/pdf", b"first upload")]),
    )
    .await
    .json()
    .await
    .expect("first json");

    let second: Value = post_process(
        &client,
        &base,
        &session_id,
        pdf_form(&[
            ("b.pdf", "application/pdf", b"second upload"),
            ("c.pdf", "application/pdf", b"and a third document"),
        ]),
    )
    .await
    .json()
    .await
    .expect("second json");

    assert_ne!(first["index"]["id"], second["index"]["id"]);
    assert_eq!(second["stats"]["documents"], 2);

    let current: Value = client
        .get(format!("{}/api/session/{}/index", base, session_id))
        .send()
        .await
        .expect("index response")
        .json()
        .await
        .expect("index json");
    assert_eq!(current["id"], second["index"]["id"]);

    handle.abort();
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let form = pdf_form(&[("notes.txt", "text/plain", b"just some notes")]);
    let response = post_process(&client, &base, &session_id, form).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "unsupported_media_type");

    handle.abort();
}

#[tokio::test]
async fn unreadable_pdf_is_an_extraction_error() {
    let (base, handle) = spawn_server_with(pipeline_with(Arc::new(PdfTextExtractor::new()))).await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let form = pdf_form(&[("bad.pdf", "application/pdf", b"this is not a pdf at all")]);
    let response = post_process(&client, &base, &session_id, form).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["code"], "extraction_error");

    let index = client
        .get(format!("{}/api/session/{}/index", base, session_id))
        .send()
        .await
        .expect("index response");
    assert_eq!(index.status(), reqwest::StatusCode::NOT_FOUND);

    handle.abort();
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/session/{}/index", base, "no-such-session"))
        .send()
        .await
        .expect("index response");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["code"], "session_not_found");

    handle.abort();
}

#[tokio::test]
async fn query_is_accepted_and_echoed() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let response = client
        .post(format!("{}/api/session/{}/query", base, session_id))
        .json(&serde_json::json!({ "query": "What is this document about?" }))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.expect("query json");
    assert_eq!(body["ok"], true);
    assert_eq!(body["query"], "What is this document about?");

    handle.abort();
}

#[tokio::test]
async fn deleted_session_is_gone() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    post_process(
        &client,
        &base,
        &session_id,
        pdf_form(&[("a.pdf", "application/pdf", b"short lived")]),
    )
    .await;

    let deleted = client
        .delete(format!("{}/api/session/{}", base, session_id))
        .send()
        .await
        .expect("delete response");
    assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);

    let index = client
        .get(format!("{}/api/session/{}/index", base, session_id))
        .send()
        .await
        .expect("index response");
    assert_eq!(index.status(), reqwest::StatusCode::NOT_FOUND);

    handle.abort();
}

#[tokio::test]
async fn events_endpoint_is_sse() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let response = tokio::time::timeout(
        Duration::from_secs(3),
        client.get(format!("{}/api/session/{}/events", base, session_id)).send(),
    )
    .await
    .expect("stream request timeout")
    .expect("stream response");

    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    assert!(
        content_type.contains("text/event-stream"),
        "unexpected content type: {content_type}"
    );

    handle.abort();
}

#[tokio::test]
async fn page_waits_for_the_event_stream_before_processing() {
    let (base, handle) = spawn_server().await;

    let page = reqwest::get(format!("{}/", base))
        .await
        .expect("page response")
        .text()
        .await
        .expect("page body");
    assert!(page.contains(r#"events.addEventListener("open""#));

    handle.abort();
}

#[tokio::test]
async fn subscribed_stream_receives_every_stage() {
    let (base, handle) = spawn_server().await;
    let client = reqwest::Client::new();
    let session_id = create_session(&client, &base).await;

    let mut events = tokio::time::timeout(
        Duration::from_secs(3),
        client.get(format!("{}/api/session/{}/events", base, session_id)).send(),
    )
    .await
    .expect("stream request timeout")
    .expect("stream response");

    let form = pdf_form(&[("hello.pdf", "application/pdf", b"Hello world\nThis is a test.")]);
    let response = post_process(&client, &base, &session_id, form).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut received = String::new();
    while !received.contains(r#""stage":"done""#) {
        let chunk = tokio::time::timeout(Duration::from_secs(3), events.chunk())
            .await
            .expect("event timeout")
            .expect("event chunk")
            .expect("stream ended early");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }

    let positions: Vec<usize> = ["extracting", "chunking", "indexing", "done"]
        .iter()
        .map(|stage| {
            received
                .find(&format!(r#""stage":"{stage}""#))
                .unwrap_or_else(|| panic!("missing {stage} event in {received}"))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "stages out of order: {received}");

    handle.abort();
}
