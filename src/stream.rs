//! The single-consumer streaming pipeline: [`StreamEvent`] plus the
//! [`ChatStream`] wrapper offering the two mutually exclusive consumption
//! modes described in the provider contract (`iter` via the `Stream` trait,
//! `collect` as a one-shot aggregation).

use crate::error::{Error, Result};
use crate::wire::{ChatResponse, FinishReason, MediaRef, ToolCallDirective, Usage};
use futures::stream::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;

/// One incremental event in a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content { delta: String },
    Reasoning { delta: String },
    ToolCall {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    Usage(Usage),
    /// One output media part (image, audio, or video). `collect()` buckets
    /// these by MIME top-level type the same way [`ChatResponse::route_media`]
    /// does for a non-streamed `send()` response.
    Media(MediaRef),
    Done { finish_reason: FinishReason },
    /// Marks the boundary between one ReAct iteration's stream and the
    /// next, emitted only by [`crate::react::ReAct::execute_stream`] - a
    /// plain provider stream never produces this variant.
    IterationBoundary { iteration: u32 },
}

/// Marks that the stream's underlying transport body has been released.
/// Cloned handles share one flag; the flag flips when the last handle (the
/// one actually wrapping the HTTP body) drops, which happens automatically
/// on full drain, error exit, or the consumer abandoning the stream -
/// Rust's ownership model makes a double-close structurally impossible
/// here, since there is exactly one owner of the underlying body at a time.
#[derive(Clone, Default)]
pub struct CloseGuard(Arc<AtomicBool>);

impl CloseGuard {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

type CollectHook = Box<dyn FnOnce(ChatResponse) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// A lazy, single-consumer sequence of [`StreamEvent`]s backed by an SSE
/// response body.
pub struct ChatStream {
    inner: Option<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>>,
    _guard: CloseGuard,
    on_collect: Option<CollectHook>,
    model: String,
    started_iter: bool,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("model", &self.model)
            .field("started_iter", &self.started_iter)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    pub fn new(
        inner: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
        guard: CloseGuard,
        model: impl Into<String>,
    ) -> Self {
        Self {
            inner: Some(inner),
            _guard: guard,
            on_collect: None,
            model: model.into(),
            started_iter: false,
        }
    }

    /// Registers a hook run with the final `ChatResponse` when `collect()`
    /// completes successfully. Used by the orchestration client to
    /// auto-append the assistant turn to memory on a successful collect.
    pub fn with_collect_hook(mut self, hook: CollectHook) -> Self {
        self.on_collect = Some(hook);
        self
    }

    /// Walks the stream to completion, accumulating content/reasoning
    /// deltas and per-index tool-call deltas into a single [`ChatResponse`].
    /// Returns the first error encountered, if any. Mutually exclusive with
    /// iterating via the `Stream` impl: calling `collect()` after any
    /// `next()` call has already been made is itself an error, since the
    /// two consumption modes are meant to be chosen once up front.
    pub async fn collect(mut self) -> Result<ChatResponse> {
        if self.started_iter {
            return Err(Error::other(
                "ChatStream::collect called after the stream was already iterated",
            ));
        }
        let mut inner = self
            .inner
            .take()
            .expect("ChatStream inner stream taken twice");

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut finish_reason = FinishReason::Stop;
        let mut usage: Option<Usage> = None;
        let mut tool_calls: BTreeMap<u32, PartialToolCall> = BTreeMap::new();
        let mut media = Vec::new();
        let mut error = None;

        while let Some(item) = inner.next().await {
            match item {
                Ok(StreamEvent::Content { delta }) => content.push_str(&delta),
                Ok(StreamEvent::Reasoning { delta }) => reasoning.push_str(&delta),
                Ok(StreamEvent::ToolCall {
                    index,
                    id,
                    name,
                    arguments_delta,
                }) => {
                    let entry = tool_calls.entry(index).or_default();
                    if let Some(id) = id {
                        entry.id = Some(id);
                    }
                    if let Some(name) = name {
                        entry.name = Some(name);
                    }
                    entry.arguments.push_str(&arguments_delta);
                }
                Ok(StreamEvent::Usage(u)) => usage = Some(u),
                Ok(StreamEvent::Media(m)) => media.push(m),
                Ok(StreamEvent::Done { finish_reason: fr }) => {
                    finish_reason = fr;
                    break;
                }
                Ok(StreamEvent::IterationBoundary { .. }) => {}
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        drop(inner); // releases the transport body exactly once

        if let Some(e) = error {
            return Err(e);
        }

        let mut directives = Vec::with_capacity(tool_calls.len());
        for (_, partial) in tool_calls {
            let (Some(id), Some(name)) = (partial.id, partial.name) else {
                continue;
            };
            let arguments = if partial.arguments.is_empty() {
                "{}".to_string()
            } else {
                partial.arguments
            };
            directives.push(ToolCallDirective::new(id, name, arguments)?);
        }

        let mut response = ChatResponse::new("", self.model.clone(), finish_reason, content, directives);
        response.usage = usage;
        if !reasoning.is_empty() {
            response.reasoning = Some(reasoning);
        }
        response.route_media(media);

        if let Some(hook) = self.on_collect.take() {
            hook(response.clone()).await;
        }

        Ok(response)
    }

    /// Wraps the stream so it yields [`Error::Timeout`] (and then ends) once
    /// `duration` has elapsed, regardless of whether the consumer is idle or
    /// actively draining - the deadline covers the full stream lifetime, not
    /// time-to-first-byte.
    pub fn with_deadline(mut self, duration: Duration) -> Self {
        let inner = self.inner.take().expect("ChatStream inner stream taken twice");
        self.inner = Some(Box::pin(DeadlineStream {
            inner,
            sleep: Box::pin(tokio::time::sleep(duration)),
            expired: false,
        }));
        self
    }

    /// Wraps the stream so `hook` fires exactly once with the terminal
    /// [`StreamOutcome`]: on a clean drain, on the first error, or - via
    /// `Drop` - if the consumer abandons the stream before either happens.
    pub fn with_completion_hook(mut self, hook: impl FnOnce(StreamOutcome) + Send + 'static) -> Self {
        let inner = self.inner.take().expect("ChatStream inner stream taken twice");
        self.inner = Some(Box::pin(CompletionStream {
            inner,
            hook: Some(Box::new(hook)),
            finished: false,
        }));
        self
    }
}

/// The terminal state observed by a [`ChatStream::with_completion_hook`]
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Drained,
    Errored,
    Abandoned,
}

struct DeadlineStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
    sleep: Pin<Box<Sleep>>,
    expired: bool,
}

impl Stream for DeadlineStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.expired {
            return Poll::Ready(None);
        }
        if self.sleep.as_mut().poll(cx).is_ready() {
            self.expired = true;
            return Poll::Ready(Some(Err(Error::Timeout)));
        }
        self.inner.as_mut().poll_next(cx)
    }
}

struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
    hook: Option<Box<dyn FnOnce(StreamOutcome) + Send>>,
    finished: bool,
}

impl Stream for CompletionStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.as_mut().poll_next(cx);
        match &poll {
            Poll::Ready(None) => {
                self.finished = true;
                if let Some(hook) = self.hook.take() {
                    hook(StreamOutcome::Drained);
                }
            }
            Poll::Ready(Some(Err(_))) => {
                self.finished = true;
                if let Some(hook) = self.hook.take() {
                    hook(StreamOutcome::Errored);
                }
            }
            _ => {}
        }
        poll
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(hook) = self.hook.take() {
                hook(StreamOutcome::Abandoned);
            }
        }
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.started_iter = true;
        let inner = self
            .inner
            .as_mut()
            .expect("ChatStream polled after collect() consumed it");
        inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    fn stream_of(events: Vec<Result<StreamEvent>>) -> ChatStream {
        let guard = CloseGuard::new();
        let s = futures::stream::iter(events);
        ChatStream::new(Box::pin(s), guard, "test-model")
    }

    #[tokio::test]
    async fn collect_concatenates_content_deltas() {
        let s = stream_of(vec![
            Ok(StreamEvent::Content { delta: "Hel".into() }),
            Ok(StreamEvent::Content { delta: "lo".into() }),
            Ok(StreamEvent::Content { delta: " world".into() }),
            Ok(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            }),
        ]);
        let resp = s.collect().await.unwrap();
        assert_eq!(resp.content, "Hello world");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn collect_assembles_tool_call_deltas_by_index() {
        let s = stream_of(vec![
            Ok(StreamEvent::ToolCall {
                index: 0,
                id: Some("c1".into()),
                name: Some("add".into()),
                arguments_delta: "{\"a\":".into(),
            }),
            Ok(StreamEvent::ToolCall {
                index: 0,
                id: None,
                name: None,
                arguments_delta: "1}".into(),
            }),
            Ok(StreamEvent::Done {
                finish_reason: FinishReason::ToolCalls,
            }),
        ]);
        let resp = s.collect().await.unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "c1");
        assert_eq!(resp.tool_calls[0].arguments, "{\"a\":1}");
        assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
    }

    #[tokio::test]
    async fn collect_surfaces_first_error() {
        let s = stream_of(vec![
            Ok(StreamEvent::Content { delta: "ok".into() }),
            Err(Error::framing("boom")),
        ]);
        let result = s.collect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn iterating_then_collecting_is_rejected() {
        let mut s = stream_of(vec![
            Ok(StreamEvent::Content { delta: "a".into() }),
            Ok(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            }),
        ]);
        let _ = s.next().await;
        assert!(s.collect().await.is_err());
    }

    #[tokio::test]
    async fn dropping_a_stream_closes_the_guard() {
        let closed = StdAtomicBool::new(false);
        let guard = CloseGuard::new();
        let guard_clone = guard.clone();
        assert!(!guard_clone.is_closed());
        drop(guard);
        assert!(guard_clone.is_closed());
        assert!(!closed.load(Ordering::SeqCst)); // sanity: local var unaffected
    }

    #[tokio::test]
    async fn deadline_cuts_off_a_stream_that_never_finishes() {
        let pending = futures::stream::pending::<Result<StreamEvent>>();
        let guard = CloseGuard::new();
        let mut s = ChatStream::new(Box::pin(pending), guard, "test-model")
            .with_deadline(Duration::from_millis(10));
        let first = s.next().await;
        assert!(matches!(first, Some(Err(Error::Timeout))));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn completion_hook_fires_once_on_clean_drain() {
        let outcome = Arc::new(std::sync::Mutex::new(None));
        let outcome_clone = outcome.clone();
        let guard = CloseGuard::new();
        let s = futures::stream::iter(vec![Ok(StreamEvent::Content { delta: "hi".into() })]);
        let mut s = ChatStream::new(Box::pin(s), guard, "test-model")
            .with_completion_hook(move |o| *outcome_clone.lock().unwrap() = Some(o));
        while s.next().await.is_some() {}
        assert_eq!(*outcome.lock().unwrap(), Some(StreamOutcome::Drained));
    }

    #[tokio::test]
    async fn completion_hook_fires_on_abandonment() {
        let outcome = Arc::new(std::sync::Mutex::new(None));
        let outcome_clone = outcome.clone();
        let guard = CloseGuard::new();
        let s = futures::stream::pending::<Result<StreamEvent>>();
        let mut s = ChatStream::new(Box::pin(s), guard, "test-model")
            .with_completion_hook(move |o| *outcome_clone.lock().unwrap() = Some(o));
        // poll once so the stream is actually driven, then drop without a terminal event
        let _ = futures::poll!(s.next());
        drop(s);
        assert_eq!(*outcome.lock().unwrap(), Some(StreamOutcome::Abandoned));
    }

    #[tokio::test]
    async fn collect_invokes_hook_with_final_response() {
        let observed = Arc::new(std::sync::Mutex::new(None));
        let observed_clone = observed.clone();
        let s = stream_of(vec![
            Ok(StreamEvent::Content { delta: "hi".into() }),
            Ok(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            }),
        ])
        .with_collect_hook(Box::new(move |resp| {
            Box::pin(async move {
                *observed_clone.lock().unwrap() = Some(resp.content);
            })
        }));
        let _ = s.collect().await.unwrap();
        assert_eq!(observed.lock().unwrap().as_deref(), Some("hi"));
    }
}
