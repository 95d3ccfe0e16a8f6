//! Retry with exponential backoff and jitter.
//!
//! Generalizes the teacher's `retry.rs`: same `RetryConfig` shape, but the
//! retryable-error classifier now matches structured HTTP status codes
//! (`Error::is_retryable`) instead of substring-matching a message, and
//! jitter is a uniform multiplier applied to the capped delay rather than an
//! additive term. Never wraps `stream()` - a streaming call that starts
//! successfully and then fails mid-stream cannot be transparently retried
//! without losing already-delivered events, so retry only ever sits in
//! front of `send()`.

use super::{SendFn, SendMiddleware};
use crate::error::Error;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Whether `delay_for` scales the capped backoff by a uniform
    /// `[0.5, 1.5)` factor. On by default to avoid synchronized retry storms
    /// across concurrent callers; tests that assert a deterministic elapsed
    /// time should turn it off.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay before retrying `attempt` (0-indexed): exponential backoff
    /// capped at `max_delay`, scaled by a uniform `[0.5, 1.5)` jitter factor
    /// when `jitter` is enabled.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential_ms = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_ms = exponential_ms.min(self.max_delay.as_millis() as f64);
        let jitter = if self.jitter { rand::thread_rng().gen_range(0.5..1.5) } else { 1.0 };
        Duration::from_millis((capped_ms * jitter).max(0.0) as u64)
    }
}

pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl SendMiddleware for RetryMiddleware {
    fn wrap(&self, next: SendFn) -> SendFn {
        let config = self.config.clone();
        Arc::new(move |cancel: CancellationToken, request| {
            let next = next.clone();
            let config = config.clone();
            Box::pin(async move {
                let mut last_error = None;
                for attempt in 0..config.max_attempts.max(1) {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    match next(cancel.clone(), request.clone()).await {
                        Ok(response) => return Ok(response),
                        Err(err) => {
                            let retryable = err.is_retryable();
                            last_error = Some(err);
                            if !retryable || attempt + 1 >= config.max_attempts {
                                break;
                            }
                            let delay = config.delay_for(attempt);
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => return Err(Error::Cancelled),
                            }
                        }
                    }
                }
                let last_error = last_error.unwrap_or_else(|| Error::other("retry loop ran zero attempts"));
                Err(Error::retry_exhausted(config.max_attempts, last_error))
            })
        })
    }
}
