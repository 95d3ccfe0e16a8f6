//! Streaming against a mocked SSE endpoint: the `collect()` aggregation path
//! and the manual `iter()` path both see the same content.

use agentcore::provider::chat_completion::ChatCompletionProvider;
use agentcore::provider::generate_content::GenerateContentProvider;
use agentcore::{Client, InMemoryStore, Memory, Provider, Role, StreamEvent};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(chunks: &[serde_json::Value]) -> Vec<u8> {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(&chunk.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn mock_stream_response() -> ResponseTemplate {
    let chunks = vec![
        serde_json::json!({
            "id": "r1", "model": "m",
            "choices": [{"delta": {"content": "Hel"}, "finish_reason": null}],
        }),
        serde_json::json!({
            "id": "r1", "model": "m",
            "choices": [{"delta": {"content": "lo"}, "finish_reason": null}],
        }),
        serde_json::json!({
            "id": "r1", "model": "m",
            "choices": [{"delta": {}, "finish_reason": "stop"}],
        }),
    ];
    ResponseTemplate::new(200).set_body_raw(sse_body(&chunks), "text/event-stream")
}

#[tokio::test]
async fn collect_aggregates_deltas_and_records_the_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/chat/completions")).respond_with(mock_stream_response()).mount(&server).await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let memory = Arc::new(InMemoryStore::new());
    let client = Client::builder(provider).with_memory(memory.clone()).build();

    let stream = client.stream(&CancellationToken::new(), "hi").await.unwrap();
    let response = stream.collect().await.unwrap();
    assert_eq!(response.content, "Hello");

    let history = memory.all(&"default".to_string()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Some(Role::Assistant));
    assert_eq!(history[1].content.as_deref(), Some("Hello"));
}

#[tokio::test]
async fn manual_iteration_sees_the_same_content_deltas_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/chat/completions")).respond_with(mock_stream_response()).mount(&server).await;

    let provider = ChatCompletionProvider::new("m", server.uri());
    let mut stream = provider.stream(&CancellationToken::new(), agentcore::ChatRequest::default()).await.unwrap();

    let mut content = String::new();
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Content { delta } => content.push_str(&delta),
            StreamEvent::Done { .. } => break,
            _ => {}
        }
    }
    assert_eq!(content, "Hello");
}

#[tokio::test]
async fn streamed_generate_content_media_parts_land_in_the_collected_response() {
    let server = MockServer::start().await;
    let chunks = vec![
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "here: "}]},
            }],
        }),
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"inlineData": {"mimeType": "image/png", "data": "Zm9v"}}]},
                "finishReason": "STOP",
            }],
        }),
    ];
    let mut body = String::new();
    for chunk in &chunks {
        body.push_str("data: ");
        body.push_str(&chunk.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/models/m:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"))
        .mount(&server)
        .await;

    let provider = GenerateContentProvider::new("m", server.uri());
    let stream = provider.stream(&CancellationToken::new(), agentcore::ChatRequest::default()).await.unwrap();
    let response = stream.collect().await.unwrap();

    assert_eq!(response.content, "here: ");
    assert_eq!(response.images.len(), 1);
    assert_eq!(response.images[0].mime_type, "image/png");
    assert!(response.audio.is_empty());
    assert!(response.videos.is_empty());
}
