//! Round trips against a local stand-in for the `/embeddings` endpoint.

#![cfg(feature = "openai")]

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use pdfchat_rag::EmbeddingProvider;
use pdfchat_rag::RagError;
use pdfchat_rag::openai::OpenAIEmbeddingProvider;
use serde_json::{Value, json};

/// What the stand-in server saw, and how it should misbehave.
#[derive(Default)]
struct Stub {
    batch_sizes: Mutex<Vec<usize>>,
    drop_last: bool,
}

/// Embeds `"text-<k>"` as `[k, 1.0]` and lists items in reverse index order.
async fn embeddings(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    stub.batch_sizes.lock().unwrap().push(inputs.len());

    let mut data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, input)| {
            let k: f32 = input.trim_start_matches("text-").parse().unwrap_or(-1.0);
            json!({ "object": "embedding", "index": index, "embedding": [k, 1.0] })
        })
        .collect();
    if stub.drop_last {
        data.pop();
    }
    Json(json!({ "object": "list", "data": data, "model": body["model"] }))
}

async fn spawn_stub(stub: Arc<Stub>) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route("/v1/embeddings", post(embeddings)).with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}/v1", addr), handle)
}

fn provider(base_url: &str) -> OpenAIEmbeddingProvider {
    OpenAIEmbeddingProvider::new("sk-test")
        .expect("provider")
        .with_base_url(base_url)
        .with_dimensions(2)
}

#[tokio::test]
async fn large_batches_are_split_and_returned_in_input_order() {
    let stub = Arc::new(Stub::default());
    let (base, handle) = spawn_stub(Arc::clone(&stub)).await;

    let owned: Vec<String> = (0..300).map(|k| format!("text-{k}")).collect();
    let texts: Vec<&str> = owned.iter().map(String::as_str).collect();
    let vectors = provider(&base).embed_batch(&texts).await.expect("embeddings");

    assert_eq!(*stub.batch_sizes.lock().unwrap(), vec![256, 44]);
    assert_eq!(vectors.len(), 300);
    for (k, vector) in vectors.iter().enumerate() {
        assert_eq!(vector, &vec![k as f32, 1.0], "vector {k} out of order");
    }

    handle.abort();
}

#[tokio::test]
async fn single_embed_round_trips() {
    let stub = Arc::new(Stub::default());
    let (base, handle) = spawn_stub(Arc::clone(&stub)).await;

    let vector = provider(&base).embed("text-7").await.expect("embedding");
    assert_eq!(vector, vec![7.0, 1.0]);
    assert_eq!(*stub.batch_sizes.lock().unwrap(), vec![1]);

    handle.abort();
}

#[tokio::test]
async fn short_response_is_an_embedding_error() {
    let stub = Arc::new(Stub { drop_last: true, ..Default::default() });
    let (base, handle) = spawn_stub(stub).await;

    let err = provider(&base)
        .embed_batch(&["text-0", "text-1", "text-2"])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { ref message, .. } if message.contains("received 2")));

    handle.abort();
}
