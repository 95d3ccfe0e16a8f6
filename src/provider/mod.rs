//! The provider abstraction: a capability set every remote model backend
//! implements, plus two reference variants covering the two wire styles
//! real APIs use today.
//!
//! This generalizes the teacher's single `Client` (hardcoded to one flavor
//! of OpenAI-compatible endpoint) into a trait, so the orchestration client
//! and the middleware chain work against any backend that can translate to
//! and from the canonical [`crate::wire`] model.

pub mod chat_completion;
pub mod generate_content;
pub mod sse;

use crate::error::{Error, Result};
use crate::stream::ChatStream;
use crate::wire::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Informational capability flags a provider may advertise. Per the
/// provider contract, these are descriptive only - nothing in this crate
/// refuses to send a request because a flag is unset; an unsupported
/// feature is caught by the remote API's own rejection, not locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub multimodal_input: bool,
    pub image_output: bool,
    pub audio_output: bool,
    pub streaming: bool,
    pub reasoning: bool,
    pub built_in_tools: bool,
    pub function_calling: bool,
}

/// The capability set every model backend implements: send one request,
/// optionally stream one request, detect a stop, and report its identity.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Sends a request and returns the complete response. `cancel` is
    /// observed at every suspension point (the HTTP call itself); a
    /// cancelled token aborts with [`Error::Cancelled`].
    async fn send(&self, cancel: &CancellationToken, request: ChatRequest) -> Result<ChatResponse>;

    /// Sends a request and returns a lazily-consumed stream of events.
    /// Streaming is an optional capability: providers that don't implement
    /// it inherit this default, which reports it as unsupported.
    async fn stream(&self, _cancel: &CancellationToken, _request: ChatRequest) -> Result<ChatStream> {
        Err(Error::other(format!(
            "provider '{}' does not support streaming",
            self.model()
        )))
    }

    /// The model identifier this provider targets.
    fn model(&self) -> &str;

    /// Informational capability flags; see [`Capabilities`].
    fn capabilities(&self) -> Capabilities;

    /// The default stop predicate: no tool-calls, and either a terminal
    /// finish reason or genuinely empty output.
    fn is_stop(&self, response: &ChatResponse) -> bool {
        response.is_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FinishReason;

    struct Stub;

    #[async_trait]
    impl Provider for Stub {
        async fn send(&self, _cancel: &CancellationToken, _request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse::new("r", "stub-model", FinishReason::Stop, "ok", vec![]))
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    #[tokio::test]
    async fn default_stream_reports_unsupported() {
        let provider = Stub;
        let cancel = CancellationToken::new();
        let err = provider.stream(&cancel, ChatRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("does not support streaming"));
    }

    #[tokio::test]
    async fn default_is_stop_delegates_to_response() {
        let provider = Stub;
        let cancel = CancellationToken::new();
        let response = provider.send(&cancel, ChatRequest::default()).await.unwrap();
        assert!(provider.is_stop(&response));
    }
}
