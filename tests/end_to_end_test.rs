//! End-to-end coverage against a mocked chat-completion endpoint: a basic
//! turn, a full tool-calling round, and a call to a tool the registry
//! doesn't know about.

use agentcore::{Client, InMemoryStore, Memory, Message, ReAct, Role, ToolRegistry};
use agentcore::provider::chat_completion::ChatCompletionProvider;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn calculator_tools() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry.add(agentcore::tool("add", "adds two numbers").param("a", "integer").param("b", "integer").build(
        |args| async move {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        },
    ));
    registry
}

#[tokio::test]
async fn basic_send_returns_content_and_records_two_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "r1",
            "model": "m",
            "choices": [{"message": {"role": "assistant", "content": "Paris"}, "finish_reason": "stop"}],
        })))
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let memory = Arc::new(InMemoryStore::new());
    let client = Client::builder(provider).with_memory(memory.clone()).build();

    let response = client.send(&CancellationToken::new(), "What is the capital of France?").await.unwrap();
    assert_eq!(response.content, "Paris");
    assert_eq!(response.finish_reason, agentcore::FinishReason::Stop);

    let history = memory.all(&"default".to_string()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Some(Role::User));
    assert_eq!(history[1].role, Some(Role::Assistant));
}

/// Alternates responses by request count: a tool-call turn, then a final
/// answer, matching the shape of a real two-turn tool round.
struct AlternatingResponder {
    calls: AtomicUsize,
}

impl Respond for AlternatingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "r1",
                "model": "m",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "add", "arguments": "{\"a\":17,\"b\":25}"}}],
                    },
                    "finish_reason": "tool_calls",
                }],
            }))
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "r2",
                "model": "m",
                "choices": [{"message": {"role": "assistant", "content": "42"}, "finish_reason": "stop"}],
            }))
        }
    }
}

#[tokio::test]
async fn tool_loop_executes_registered_tool_and_reaches_final_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(AlternatingResponder { calls: AtomicUsize::new(0) })
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let memory = Arc::new(InMemoryStore::new());
    let client = Arc::new(
        Client::builder(provider)
            .with_memory(memory.clone())
            .with_tools(calculator_tools())
            .build(),
    );
    let react = ReAct::new(client);

    let response = react.execute(&CancellationToken::new(), "what is 17+25").await.unwrap();
    assert_eq!(response.content, "42");

    let history = memory.all(&"default".to_string()).await.unwrap();
    let roles: Vec<_> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Some(Role::User), Some(Role::Assistant), Some(Role::Tool), Some(Role::Assistant)]
    );
    assert_eq!(history[2].content.as_deref(), Some("42"));
}

#[tokio::test]
async fn unknown_tool_surfaces_as_a_tool_result_not_a_failed_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(move |req: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let already_has_tool_result = body["messages"]
                .as_array()
                .map(|ms| ms.iter().any(|m| m["role"] == "tool"))
                .unwrap_or(false);
            if already_has_tool_result {
                ResponseTemplate::new(200).set_body_json(json!({
                    "id": "r2",
                    "model": "m",
                    "choices": [{"message": {"role": "assistant", "content": "couldn't find that tool"}, "finish_reason": "stop"}],
                }))
            } else {
                ResponseTemplate::new(200).set_body_json(json!({
                    "id": "r1",
                    "model": "m",
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "search_web", "arguments": "{}"}}],
                        },
                        "finish_reason": "tool_calls",
                    }],
                }))
            }
        })
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let memory = Arc::new(InMemoryStore::new());
    let client = Arc::new(Client::builder(provider).with_memory(memory.clone()).build());
    let react = ReAct::new(client);

    let response = react.execute(&CancellationToken::new(), "look something up").await.unwrap();
    assert_eq!(response.content, "couldn't find that tool");

    let history = memory.all(&"default".to_string()).await.unwrap();
    let tool_turn = history.iter().find(|m| m.role == Some(Role::Tool)).unwrap();
    assert_eq!(tool_turn.content.as_deref(), Some("error: unknown tool search_web"));
}

#[tokio::test]
async fn record_appends_without_sending_a_turn() {
    let memory = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ChatCompletionProvider::new("m", "http://unused.invalid"));
    let client = Client::builder(provider).with_memory(memory.clone()).build();
    client.record(vec![Message::tool("c1", "add", "42").unwrap()]).await;
    let history = memory.all(&"default".to_string()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Some(Role::Tool));
}
