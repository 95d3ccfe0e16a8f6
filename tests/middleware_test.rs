//! Retry and timeout middleware driven against a mocked endpoint: a
//! transient failure that recovers within budget, one that exhausts it, and
//! a slow response that a deadline cuts off before it ever lands.

use agentcore::middleware::retry::{RetryConfig, RetryMiddleware};
use agentcore::middleware::timeout::TimeoutMiddleware;
use agentcore::provider::chat_completion::ChatCompletionProvider;
use agentcore::{Client, Error, InMemoryStore, Memory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct FailNTimesThenSucceed {
    calls: AtomicUsize,
    failures: usize,
}

impl Respond for FailNTimesThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(503).set_body_string("server overloaded")
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "r1",
                "model": "m",
                "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
            }))
        }
    }
}

#[tokio::test]
async fn succeeds_after_two_transient_failures_within_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailNTimesThenSucceed { calls: AtomicUsize::new(0), failures: 2 })
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let retry = Arc::new(RetryMiddleware::new(
        RetryConfig::new().with_max_attempts(3).with_initial_delay(Duration::from_millis(5)).with_max_delay(Duration::from_millis(20)),
    ));
    let client = Client::builder(provider).with_send_middleware(retry).build();

    let response = client.send(&CancellationToken::new(), "hi").await.unwrap();
    assert_eq!(response.content, "ok");
}

#[tokio::test]
async fn exhausting_retries_surfaces_retry_exhausted_and_records_no_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailNTimesThenSucceed { calls: AtomicUsize::new(0), failures: usize::MAX })
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let retry = Arc::new(RetryMiddleware::new(
        RetryConfig::new().with_max_attempts(2).with_initial_delay(Duration::from_millis(1)).with_max_delay(Duration::from_millis(5)),
    ));
    let memory = Arc::new(InMemoryStore::new());
    let client = Client::builder(provider).with_memory(memory.clone()).with_send_middleware(retry).build();

    let err = client.send(&CancellationToken::new(), "hi").await.unwrap_err();
    assert!(matches!(err, Error::RetryExhausted { attempts: 2, .. }));

    let history = memory.all(&"default".to_string()).await.unwrap();
    assert_eq!(history.len(), 1); // the user turn, but no assistant reply
    assert_eq!(history[0].role, Some(agentcore::Role::User));
}

#[tokio::test]
async fn jitter_off_makes_retry_delay_deterministic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailNTimesThenSucceed { calls: AtomicUsize::new(0), failures: 2 })
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let retry = Arc::new(RetryMiddleware::new(
        RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(20))
            .with_jitter(false),
    ));
    let client = Client::builder(provider).with_send_middleware(retry).build();

    let started = std::time::Instant::now();
    let response = client.send(&CancellationToken::new(), "hi").await.unwrap();
    assert_eq!(response.content, "ok");
    // Two retries at 10ms then 20ms (capped), no jitter: at least 30ms elapsed.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn a_deadline_shorter_than_the_response_yields_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(serde_json::json!({
                    "id": "r1",
                    "model": "m",
                    "choices": [{"message": {"role": "assistant", "content": "too slow"}, "finish_reason": "stop"}],
                })),
        )
        .mount(&server)
        .await;

    let provider = Arc::new(ChatCompletionProvider::new("m", server.uri()));
    let timeout = Arc::new(TimeoutMiddleware::new(Duration::from_millis(50)));
    let memory = Arc::new(InMemoryStore::new());
    let client = Client::builder(provider).with_memory(memory.clone()).with_middleware(timeout).build();

    let started = std::time::Instant::now();
    let err = client.send(&CancellationToken::new(), "hi").await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert!(started.elapsed() < Duration::from_millis(190));

    let history = memory.all(&"default".to_string()).await.unwrap();
    assert_eq!(history.len(), 1); // only the user turn was ever appended
}
