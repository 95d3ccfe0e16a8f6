//! Structured request logging.
//!
//! The teacher has no logging at all (`println!` in a couple of examples,
//! nothing in the library itself); this replaces that with `tracing::info!`
//! calls at three configurable verbosity levels, matching the corpus's
//! usual `tracing` idiom for ambient observability.

use super::{SendFn, SendMiddleware, StreamFn, StreamMiddleware};
use crate::stream::StreamOutcome;
use std::sync::Arc;
use std::time::Instant;

/// Controls which events [`LoggingMiddleware`] emits. Ordered so a caller can
/// compare (`level >= LogLevel::Standard`) rather than match every variant;
/// start/finish events gate on `Standard`, the completion event always fires
/// regardless of level since it also carries the duration a caller needs for
/// basic latency visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Minimal,
    Standard,
    Verbose,
}

/// Emits a `tracing::info!` pair (start/finish or start/drained) around each
/// send or stream call, at the configured [`LogLevel`].
pub struct LoggingMiddleware {
    level: LogLevel,
}

impl LoggingMiddleware {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl SendMiddleware for LoggingMiddleware {
    /// Logs a `"provider request starting"` event (at `Standard` and above),
    /// times the wrapped call, then logs `"provider request finished"` or
    /// `"provider request failed"` with the elapsed milliseconds. Always
    /// returns whatever `next` returned, unaltered.
    fn wrap(&self, next: SendFn) -> SendFn {
        let level = self.level;
        Arc::new(move |cancel, request| {
            let next = next.clone();
            Box::pin(async move {
                let model = request.model.clone().unwrap_or_default();
                if level >= LogLevel::Standard {
                    tracing::info!(model, message_count = request.messages.len(), "provider request starting");
                }
                let started = Instant::now();
                let result = next(cancel, request).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(response) => tracing::info!(
                        model,
                        duration_ms,
                        finish_reason = ?response.finish_reason,
                        "provider request finished"
                    ),
                    Err(err) => tracing::info!(model, duration_ms, error = %err, "provider request failed"),
                }
                result
            })
        })
    }
}

impl StreamMiddleware for LoggingMiddleware {
    /// Same start-event logging as the `SendMiddleware` impl, but the finish
    /// log is attached as a completion hook on the returned [`crate::stream::ChatStream`]
    /// rather than logged immediately - a stream's outcome (drained, errored,
    /// or abandoned) isn't known until the caller finishes consuming it.
    fn wrap(&self, next: StreamFn) -> StreamFn {
        let level = self.level;
        Arc::new(move |cancel, request| {
            let next = next.clone();
            Box::pin(async move {
                let model = request.model.clone().unwrap_or_default();
                if level >= LogLevel::Standard {
                    tracing::info!(model, message_count = request.messages.len(), "provider stream starting");
                }
                let started = Instant::now();
                let stream = next(cancel, request).await?;
                let model_for_hook = model.clone();
                Ok(stream.with_completion_hook(move |outcome| {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    match outcome {
                        StreamOutcome::Drained => {
                            tracing::info!(model = model_for_hook, duration_ms, "provider stream drained")
                        }
                        StreamOutcome::Errored => {
                            tracing::info!(model = model_for_hook, duration_ms, "provider stream errored")
                        }
                        StreamOutcome::Abandoned => {
                            tracing::info!(model = model_for_hook, duration_ms, "provider stream abandoned")
                        }
                    }
                }))
            })
        })
    }
}
