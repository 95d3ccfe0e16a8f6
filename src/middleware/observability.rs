//! Request spans and an observer hook.
//!
//! No teacher counterpart. The `gen_ai.*`-tagged `tracing::info_span!`
//! pattern is read from the corpus's richest agent-loop instrumentation
//! (rig-core's streaming request span); this crate doesn't vendor a metrics
//! crate for it, matching the corpus's general preference for `tracing`
//! over a dedicated metrics pipeline.

use super::{SendFn, SendMiddleware, StreamFn, StreamMiddleware};
use crate::stream::StreamOutcome;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Receives one record per completed request. The default implementation
/// emits it as a structured `tracing::info!` line; a caller wanting real
/// metrics can implement this against whatever sink they already use.
pub trait Observer: Send + Sync {
    fn record_request(&self, model: &str, outcome: &str, duration: Duration);
}

#[derive(Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record_request(&self, model: &str, outcome: &str, duration: Duration) {
        tracing::info!(
            model,
            outcome,
            duration_ms = duration.as_millis() as u64,
            "gen_ai.request.recorded"
        );
    }
}

pub struct ObservabilityMiddleware {
    observer: Arc<dyn Observer>,
}

impl ObservabilityMiddleware {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }
}

impl SendMiddleware for ObservabilityMiddleware {
    fn wrap(&self, next: SendFn) -> SendFn {
        let observer = self.observer.clone();
        Arc::new(move |cancel, request| {
            let next = next.clone();
            let observer = observer.clone();
            Box::pin(async move {
                let model = request.model.clone().unwrap_or_default();
                let message_count = request.messages.len();
                let tool_count = request.tools.as_ref().map_or(0, Vec::len);
                let span = tracing::info_span!(
                    "gen_ai.chat",
                    "gen_ai.request.model" = %model,
                    streaming = false,
                    message_count,
                    tool_count,
                    finish_reason = tracing::field::Empty,
                    "gen_ai.usage.prompt_tokens" = tracing::field::Empty,
                    "gen_ai.usage.completion_tokens" = tracing::field::Empty,
                );
                async move {
                    let started = Instant::now();
                    let result = next(cancel, request).await;
                    let current = tracing::Span::current();
                    match &result {
                        Ok(response) => {
                            current.record("finish_reason", tracing::field::debug(response.finish_reason));
                            if let Some(usage) = &response.usage {
                                current.record("gen_ai.usage.prompt_tokens", usage.prompt_tokens.unwrap_or(0));
                                current.record("gen_ai.usage.completion_tokens", usage.completion_tokens.unwrap_or(0));
                            }
                            observer.record_request(&model, "ok", started.elapsed());
                        }
                        Err(_) => observer.record_request(&model, "error", started.elapsed()),
                    }
                    result
                }
                .instrument(span)
                .await
            })
        })
    }
}

impl StreamMiddleware for ObservabilityMiddleware {
    fn wrap(&self, next: StreamFn) -> StreamFn {
        let observer = self.observer.clone();
        Arc::new(move |cancel, request| {
            let next = next.clone();
            let observer = observer.clone();
            Box::pin(async move {
                let model = request.model.clone().unwrap_or_default();
                let started = Instant::now();
                let stream = next(cancel, request).await?;
                let model_for_hook = model.clone();
                Ok(stream.with_completion_hook(move |outcome| {
                    let label = match outcome {
                        StreamOutcome::Drained => "ok",
                        StreamOutcome::Errored => "error",
                        StreamOutcome::Abandoned => "abandoned",
                    };
                    observer.record_request(&model_for_hook, label, started.elapsed());
                }))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ChatRequest, ChatResponse, FinishReason};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        records: Mutex<Vec<(String, String)>>,
    }

    impl Observer for RecordingObserver {
        fn record_request(&self, model: &str, outcome: &str, _duration: Duration) {
            self.records.lock().unwrap().push((model.to_string(), outcome.to_string()));
        }
    }

    #[tokio::test]
    async fn records_ok_outcome_for_a_successful_send() {
        let observer = Arc::new(RecordingObserver::default());
        let mw = ObservabilityMiddleware::new(observer.clone());
        let base: SendFn = Arc::new(|_cancel, _request| {
            Box::pin(async { Ok(ChatResponse::new("r", "m", FinishReason::Stop, "ok", vec![])) })
        });
        let chained = SendMiddleware::wrap(&mw, base);
        let mut request = ChatRequest::default();
        request.model = Some("test-model".to_string());
        chained(tokio_util::sync::CancellationToken::new(), request).await.unwrap();
        let records = observer.records.lock().unwrap();
        assert_eq!(records.as_slice(), &[("test-model".to_string(), "ok".to_string())]);
    }

    #[tokio::test]
    async fn records_error_outcome_for_a_failed_send() {
        let observer = Arc::new(RecordingObserver::default());
        let mw = ObservabilityMiddleware::new(observer.clone());
        let failing: SendFn = Arc::new(|_cancel, _request| {
            Box::pin(async { Err(crate::error::Error::other("boom")) })
        });
        let chained = SendMiddleware::wrap(&mw, failing);
        let _ = chained(tokio_util::sync::CancellationToken::new(), ChatRequest::default()).await;
        let records = observer.records.lock().unwrap();
        assert_eq!(records[0].1, "error");
    }
}
