//! Error taxonomy for the agent core.
//!
//! Every variant wraps its cause with a layer tag so a caller can tell where
//! in the stack a failure happened just from the `Display` text, without
//! reaching for `Debug`. Provider policy (content filters, safety blocks)
//! is deliberately NOT represented here — that surfaces as a normal
//! `ChatResponse` with a `content_filter` finish reason and a refusal
//! string, never as an `Err`.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy shared by every layer of the core.
#[derive(Error, Debug)]
pub enum Error {
    /// An HTTP status outside 200-299. Carries the status and the response
    /// body, truncated to a bounded length so a misbehaving server can't
    /// blow up logs.
    #[error("transport error (status {status:?}): {body}")]
    Transport { status: Option<u16>, body: String },

    /// The underlying reqwest/hyper layer failed before a status was even
    /// available (DNS, connect, TLS, body read).
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// SSE framing failure: oversized frame, malformed event, or a scanner
    /// invariant violation. Non-retryable; terminates the stream.
    #[error("sse framing error: {0}")]
    Framing(String),

    /// Response JSON failed to parse, or a required field was missing.
    /// Non-retryable.
    #[error("wire decode error: {0}")]
    Decode(String),

    /// Serde (de)serialization failure not already covered by `Decode`.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid library configuration (bad base URL, missing model, etc).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The cancellation token was observed to be cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A per-call deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// Every retry attempt was exhausted. Wraps the last cause and records
    /// how many attempts were made.
    #[error("retry exhausted after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A structured-output parse failed even after the one repair retry.
    #[error("structured output parse failed: {0}")]
    SchemaParse(String),

    /// Tool-loop-level errors that are not tool-handler errors (e.g. the
    /// iteration limit was reached before the model stopped).
    #[error("tool loop error: {0}")]
    Tool(String),

    /// Catch-all for anything else.
    #[error("error: {0}")]
    Other(String),
}

impl Error {
    pub fn transport(status: Option<u16>, body: impl Into<String>) -> Self {
        const MAX_BODY: usize = 4096;
        let mut body = body.into();
        if body.len() > MAX_BODY {
            body.truncate(MAX_BODY);
            body.push_str("...(truncated)");
        }
        Error::Transport { status, body }
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        Error::Framing(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn schema_parse(msg: impl Into<String>) -> Self {
        Error::SchemaParse(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn retry_exhausted(attempts: u32, source: Error) -> Self {
        Error::RetryExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// The default retry classifier: transport errors carrying one of the
    /// standard retryable HTTP status codes, plus raw connection failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { status: Some(code), .. } => {
                matches!(code, 429 | 500 | 502 | 503 | 529)
            }
            Error::Http(_) => true,
            Error::Timeout => true,
            _ => false,
        }
    }
}
