//! Per-call deadlines.
//!
//! No teacher counterpart - the teacher has no timeout handling at all.
//! `send()` is wrapped directly in `tokio::time::timeout`; `stream()`
//! instead attaches the deadline to the returned [`ChatStream`] so it covers
//! the full consumption lifetime rather than just getting the first byte.

use super::{SendFn, SendMiddleware, StreamFn, StreamMiddleware};
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Bounds a send or stream call to a fixed [`Duration`], surfacing
/// [`Error::Timeout`] if it's exceeded.
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl SendMiddleware for TimeoutMiddleware {
    /// Races `next(cancel, request)` against `tokio::time::timeout`; the
    /// loser is dropped and its resources cleaned up, the winner's result
    /// (or [`Error::Timeout`] if the clock won) is returned.
    fn wrap(&self, next: SendFn) -> SendFn {
        let duration = self.duration;
        Arc::new(move |cancel, request| {
            let next = next.clone();
            Box::pin(async move {
                match tokio::time::timeout(duration, next(cancel, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout),
                }
            })
        })
    }
}

impl StreamMiddleware for TimeoutMiddleware {
    /// Attaches the deadline to the returned stream via
    /// [`crate::stream::ChatStream::with_deadline`] instead of timing out the
    /// call that establishes the stream - the deadline covers the whole
    /// consumption lifetime, since a stream that produces its first byte
    /// quickly can still stall indefinitely on a later one.
    fn wrap(&self, next: StreamFn) -> StreamFn {
        let duration = self.duration;
        Arc::new(move |cancel, request| {
            let next = next.clone();
            Box::pin(async move {
                let stream = next(cancel, request).await?;
                Ok(stream.with_deadline(duration))
            })
        })
    }
}
