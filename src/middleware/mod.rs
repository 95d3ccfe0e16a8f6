//! The request middleware chain: composable wrappers around a provider's
//! `send`/`stream` calls.
//!
//! There's no teacher analog for the chain shape itself - the teacher calls
//! its provider directly - but the shape matches the wrapper-of-closures
//! idiom the corpus uses for provider-call pipelines: each middleware takes
//! the next function in the chain and returns a new function that wraps it.
//! Composition is a right-fold so the first-registered middleware ends up
//! outermost (it sees the call first and the result last).

pub mod logging;
pub mod observability;
pub mod retry;
pub mod timeout;

use crate::error::Result;
use crate::stream::ChatStream;
use crate::wire::{ChatRequest, ChatResponse};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A terminal or already-wrapped `send` call.
pub type SendFn = Arc<dyn Fn(CancellationToken, ChatRequest) -> BoxFuture<'static, Result<ChatResponse>> + Send + Sync>;

/// A terminal or already-wrapped `stream` call.
pub type StreamFn = Arc<dyn Fn(CancellationToken, ChatRequest) -> BoxFuture<'static, Result<ChatStream>> + Send + Sync>;

/// A middleware wrapping non-streaming calls.
pub trait SendMiddleware: Send + Sync {
    fn wrap(&self, next: SendFn) -> SendFn;
}

/// A middleware wrapping streaming calls.
pub trait StreamMiddleware: Send + Sync {
    fn wrap(&self, next: StreamFn) -> StreamFn;
}

/// Composes `middlewares` around `base`, first-registered outermost.
pub fn chain_send(middlewares: &[Arc<dyn SendMiddleware>], base: SendFn) -> SendFn {
    middlewares.iter().rev().fold(base, |next, mw| mw.wrap(next))
}

/// Composes `middlewares` around `base`, first-registered outermost.
pub fn chain_stream(middlewares: &[Arc<dyn StreamMiddleware>], base: StreamFn) -> StreamFn {
    middlewares.iter().rev().fold(base, |next, mw| mw.wrap(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FinishReason;
    use std::sync::Mutex;

    struct RecordingMiddleware {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SendMiddleware for RecordingMiddleware {
        fn wrap(&self, next: SendFn) -> SendFn {
            let name = self.name;
            let log = self.log.clone();
            Arc::new(move |cancel, request| {
                let next = next.clone();
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(name);
                    next(cancel, request).await
                })
            })
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base: SendFn = Arc::new(|_cancel, _request| {
            Box::pin(async { Ok(ChatResponse::new("r", "m", FinishReason::Stop, "ok", vec![])) })
        });
        let middlewares: Vec<Arc<dyn SendMiddleware>> = vec![
            Arc::new(RecordingMiddleware { name: "outer", log: log.clone() }),
            Arc::new(RecordingMiddleware { name: "inner", log: log.clone() }),
        ];
        let chained = chain_send(&middlewares, base);
        chained(CancellationToken::new(), ChatRequest::default()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }
}
