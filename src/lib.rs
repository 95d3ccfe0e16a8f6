//! # agentcore
//!
//! A provider-neutral Rust library for building conversational agents on top
//! of remote LLM backends: an orchestration client, a provider abstraction
//! unifying "chat-completion" and "generateContent" wire styles, a
//! middleware chain, a ReAct tool loop, and an SSE streaming pipeline.
//!
//! ## Key Features
//!
//! - **Provider-neutral wire model**: one canonical request/response shape
//!   that every backend translates to and from
//! - **Pluggable providers**: OpenAI-compatible chat-completion endpoints
//!   (LM Studio, Ollama, llama.cpp, vLLM, OpenAI itself) and Gemini-style
//!   generateContent endpoints, behind one `Provider` trait
//! - **Streaming**: a single-consumer `ChatStream` exposing both an
//!   incremental `Stream` of events and a one-shot `collect()` aggregation
//! - **Tool calling**: a case-insensitive `ToolRegistry` with automatic
//!   JSON Schema generation from simple type notation
//! - **ReAct agent loop**: bounded tool-call/continuation iteration with
//!   panic-recovered handlers and a dedicated iteration-limit error
//! - **Middleware chain**: retry, timeout, logging, and observability,
//!   composed once at client-build time
//! - **Pluggable memory**: an append-only, session-scoped conversation log
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentcore::{Client, InMemoryStore, chat_completion::ChatCompletionProvider};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Arc::new(ChatCompletionProvider::new("qwen2.5-32b-instruct", "http://localhost:1234/v1"));
//!     let client = Client::builder(provider)
//!         .with_memory(Arc::new(InMemoryStore::new()))
//!         .with_system_prompt("You are a helpful assistant")
//!         .build();
//!
//!     let response = client.send(&CancellationToken::new(), "What's the capital of France?").await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **wire**: the canonical provider-neutral request/response/message model
//! - **provider**: the `Provider` trait plus `chat_completion`, `generate_content`, and `sse` implementations
//! - **stream**: the streaming event pipeline (`StreamEvent`, `ChatStream`)
//! - **memory**: session-scoped conversation history (`Memory`, `InMemoryStore`)
//! - **tools**: tool definitions and the `ToolRegistry`
//! - **middleware**: the send/stream middleware chain plus retry, timeout, logging, observability
//! - **client**: the orchestration client (`Client`, `ClientBuilder`)
//! - **react**: the ReAct tool loop (`ReAct`)
//! - **config**: provider configuration helpers (base URL/API key/model resolution)
//! - **context**: manual token estimation and history truncation utilities
//! - **error**: the crate's `Error` enum and `Result` alias

mod client;
mod config;
mod context;
mod error;
mod memory;
pub mod middleware;
pub mod provider;
mod react;
mod stream;
mod tools;
mod wire;

// --- Orchestration client ---

pub use client::{Client, ClientBuilder};

// --- ReAct agent loop ---

pub use react::ReAct;

// --- Provider abstraction ---

pub use provider::{Capabilities, Provider};
pub use provider::chat_completion;
pub use provider::generate_content;

// --- Streaming ---

pub use stream::{ChatStream, StreamEvent, StreamOutcome};

// --- Memory ---

pub use memory::{InMemoryStore, Memory, SessionId};

// --- Tool system ---

pub use tools::{Tool, ToolBuilder, ToolRegistry, tool};

// --- Canonical wire model ---

pub use wire::{
    ChatRequest, ChatResponse, Citation, CodeExecutionRecord, ContentPart, FinishReason,
    GenerationConfig, GroundingMetadata, GroundingSource, MediaRef, MediaSource, Message, Role,
    ToolCallDirective, ToolChoice, ToolDescriptor, Usage,
};

// --- Provider configuration ---

pub use config::{Backend, get_base_url, get_model};

// --- Context management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error handling ---

pub use error::{Error, Result};

/// Convenience module bringing in the most commonly used types and
/// functions. Import with `use agentcore::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ChatResponse, Client, ClientBuilder, Error, InMemoryStore, Memory, Message, ReAct, Result,
        Role, Tool, ToolRegistry, tool,
    };
}
