//! # The orchestration client
//!
//! [`Client`] is the fixed point where a [`crate::provider::Provider`], an
//! optional [`Memory`] store, a [`ToolRegistry`], a middleware chain, and an
//! optional [`crate::middleware::observability::Observer`] are wired
//! together once, at [`ClientBuilder::build`], into two entry points a
//! caller actually uses: [`Client::send`] for a single request/response turn
//! and [`Client::stream`] for the same turn delivered incrementally.
//!
//! ## Why history lives outside the client
//!
//! An earlier design (keeping a `Vec<Message>` field directly on `Client`,
//! replaying only the text portion of past assistant turns on every
//! request) silently dropped tool-calls, reasoning, and code-execution
//! records from history on every replay - a multi-turn tool conversation
//! would forget its own tool calls the moment a new turn was sent. Here the
//! client owns no history itself: history lives behind the [`Memory`] trait,
//! and the *full* [`Message`] a provider returns - content, reasoning,
//! tool-calls, code-executions - is appended back via
//! [`Client::append_assistant_turn`], so nothing is lost across turns. A
//! client built with no `Memory` at all still works; it just never
//! remembers anything past the current call.
//!
//! ## Middleware composition happens once
//!
//! [`ClientBuilder::build`] folds every registered middleware (plus an
//! auto-prepended observability wrapper, if an observer was registered)
//! into `send_chain`/`stream_chain` a single time. A `Client` call never
//! re-walks the middleware list per request - it just invokes the
//! already-composed closure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentcore::provider::chat_completion::ChatCompletionProvider;
//! use agentcore::{Client, InMemoryStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> agentcore::Result<()> {
//! let provider = Arc::new(ChatCompletionProvider::new("gpt-4o-mini", "http://localhost:1234/v1"));
//! let memory = Arc::new(InMemoryStore::new());
//! let client = Client::builder(provider).with_memory(memory).build();
//!
//! let response = client.send(&CancellationToken::new(), "What's the capital of France?").await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::memory::{Memory, SessionId};
use crate::middleware::observability::{ObservabilityMiddleware, Observer};
use crate::middleware::{BoxFuture, SendFn, SendMiddleware, StreamFn, StreamMiddleware, chain_send, chain_stream};
use crate::provider::Provider;
use crate::stream::ChatStream;
use crate::tools::ToolRegistry;
use crate::wire::{ChatRequest, ChatResponse, GenerationConfig, Message};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) const REPAIR_PROMPT: &str = "your last JSON was invalid; resend only valid JSON";

/// Builds a [`Client`]. Middleware and an observer are folded into the
/// send/stream chains exactly once, at [`ClientBuilder::build`] - a request
/// never re-traverses the chain per turn.
pub struct ClientBuilder {
    provider: Arc<dyn Provider>,
    memory: Option<Arc<dyn Memory>>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    session: SessionId,
    send_middlewares: Vec<Arc<dyn SendMiddleware>>,
    stream_middlewares: Vec<Arc<dyn StreamMiddleware>>,
    observer: Option<Arc<dyn Observer>>,
}

impl ClientBuilder {
    /// Starts a builder around `provider`. Every other field defaults to
    /// empty/disabled: no memory (history is not kept), no tools, no system
    /// prompt, session `"default"`, no middleware, no observer.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            memory: None,
            tools: ToolRegistry::new(),
            system_prompt: None,
            session: "default".to_string(),
            send_middlewares: Vec::new(),
            stream_middlewares: Vec::new(),
            observer: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Registers the tool set this client advertises to the provider on
    /// every request and dispatches through on a ReAct tool-call. An empty
    /// registry (the default) omits `tools` from the request entirely rather
    /// than sending an empty list.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the system prompt sent with every request built by this client.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Scopes this client's history to a named session instead of the
    /// `"default"` one. Multiple clients can share one [`Memory`] store
    /// under distinct sessions without interfering with each other.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Registers a middleware wrapping both send and stream calls. Most
    /// middlewares (timeout, logging, observability) implement both traits;
    /// retry is send-only and is registered via [`ClientBuilder::with_send_middleware`].
    pub fn with_middleware<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: SendMiddleware + StreamMiddleware + 'static,
    {
        self.send_middlewares.push(middleware.clone());
        self.stream_middlewares.push(middleware);
        self
    }

    pub fn with_send_middleware(mut self, middleware: Arc<dyn SendMiddleware>) -> Self {
        self.send_middlewares.push(middleware);
        self
    }

    pub fn with_stream_middleware(mut self, middleware: Arc<dyn StreamMiddleware>) -> Self {
        self.stream_middlewares.push(middleware);
        self
    }

    /// Registers an observer. Per the middleware contract, this is
    /// auto-prepended as the outermost wrapper, ahead of any explicitly
    /// registered middleware.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Finishes the builder. Wraps `provider.send`/`provider.stream` in a
    /// base closure, then right-folds the registered middleware around it
    /// (innermost = last-registered, outermost = the observer, if any) via
    /// [`chain_send`]/[`chain_stream`]. This fold happens exactly once here,
    /// not per request.
    pub fn build(self) -> Client {
        let model = self.provider.model().to_string();

        let provider = self.provider.clone();
        let base_send: SendFn = Arc::new(move |cancel, request| {
            let provider = provider.clone();
            Box::pin(async move { provider.send(&cancel, request).await }) as BoxFuture<'static, Result<ChatResponse>>
        });
        let provider = self.provider.clone();
        let base_stream: StreamFn = Arc::new(move |cancel, request| {
            let provider = provider.clone();
            Box::pin(async move { provider.stream(&cancel, request).await }) as BoxFuture<'static, Result<ChatStream>>
        });

        let mut send_middlewares = self.send_middlewares;
        let mut stream_middlewares = self.stream_middlewares;
        if let Some(observer) = self.observer {
            let observability = Arc::new(ObservabilityMiddleware::new(observer));
            send_middlewares.insert(0, observability.clone());
            stream_middlewares.insert(0, observability);
        }

        Client {
            model,
            memory: self.memory,
            tools: self.tools,
            system_prompt: self.system_prompt,
            session: self.session,
            send_chain: chain_send(&send_middlewares, base_send),
            stream_chain: chain_stream(&stream_middlewares, base_stream),
        }
    }
}

/// A provider plus conversation memory, tools, and an applied middleware
/// chain, exposing the two turn-taking entry points a caller actually uses.
pub struct Client {
    model: String,
    memory: Option<Arc<dyn Memory>>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    session: SessionId,
    send_chain: SendFn,
    stream_chain: StreamFn,
}

impl Client {
    pub fn builder(provider: Arc<dyn Provider>) -> ClientBuilder {
        ClientBuilder::new(provider)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Appends messages directly to this client's session history without
    /// sending a turn. Used by callers - the ReAct loop, in particular -
    /// that need to record turns the client itself didn't generate, such as
    /// tool-result messages.
    pub async fn record(&self, messages: Vec<Message>) {
        if let Some(memory) = &self.memory {
            memory.append(&self.session, messages).await;
        }
    }

    fn build_request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: Some(self.model.clone()),
            system_prompt: self.system_prompt.clone(),
            messages,
            tools: (!self.tools.is_empty()).then(|| self.tools.descriptors()),
            tool_choice: None,
            generation: GenerationConfig::default(),
            response_format: None,
        }
    }

    /// Appends `user_text` to memory (if configured) and returns the full
    /// history to send: the memory's contents if configured, or just the
    /// new user turn otherwise.
    async fn append_user_turn(&self, user_text: &str) -> Vec<Message> {
        let user_message = Message::user(user_text);
        let Some(memory) = &self.memory else {
            return vec![user_message];
        };
        memory.append(&self.session, vec![user_message]).await;
        memory.all(&self.session).await.unwrap_or_default()
    }

    /// Appends the full assistant turn - content, reasoning, tool-calls, and
    /// code-executions - back to memory, unlike the teacher's text-only replay.
    async fn append_assistant_turn(&self, response: &ChatResponse) {
        let Some(memory) = &self.memory else { return };
        let mut message = Message::assistant(response.content.clone());
        if let Some(reasoning) = &response.reasoning {
            message = message.with_reasoning(reasoning.clone());
        }
        if !response.tool_calls.is_empty() {
            message = message.with_tool_calls(response.tool_calls.clone());
        }
        if !response.code_executions.is_empty() {
            message = message.with_code_executions(response.code_executions.clone());
        }
        memory.append(&self.session, vec![message]).await;
    }

    /// Sends one turn: appends `user_text` to memory (if configured), sends
    /// the full history through the middleware chain to the provider, then
    /// appends the assistant's reply back. Tool-calls in the response are
    /// returned as-is; executing them and feeding the results back in is the
    /// ReAct agent's job, not the client's.
    ///
    /// ```rust,no_run
    /// # use agentcore::provider::chat_completion::ChatCompletionProvider;
    /// # use agentcore::Client;
    /// # use std::sync::Arc;
    /// # use tokio_util::sync::CancellationToken;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> agentcore::Result<()> {
    /// let provider = Arc::new(ChatCompletionProvider::new("gpt-4o-mini", "http://localhost:1234/v1"));
    /// let client = Client::builder(provider).build();
    /// let response = client.send(&CancellationToken::new(), "hi").await?;
    /// println!("{}", response.content);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&self, cancel: &CancellationToken, user_text: &str) -> Result<ChatResponse> {
        let history = self.append_user_turn(user_text).await;
        let request = self.build_request(history);
        let response = (self.send_chain)(cancel.clone(), request).await?;
        self.append_assistant_turn(&response).await;
        Ok(response)
    }

    /// Sends one turn and returns a lazily-consumed stream. Memory append
    /// for the assistant turn happens only if the caller consumes the
    /// stream via `collect()` - a caller driving `iter()` manually is
    /// responsible for recording the turn itself.
    pub async fn stream(&self, cancel: &CancellationToken, user_text: &str) -> Result<ChatStream> {
        let history = self.append_user_turn(user_text).await;
        let request = self.build_request(history);
        let stream = (self.stream_chain)(cancel.clone(), request).await?;
        let memory = self.memory.clone();
        let session = self.session.clone();
        Ok(stream.with_collect_hook(Box::new(move |response| {
            Box::pin(async move {
                let Some(memory) = memory else { return };
                let mut message = Message::assistant(response.content.clone());
                if let Some(reasoning) = &response.reasoning {
                    message = message.with_reasoning(reasoning.clone());
                }
                if !response.tool_calls.is_empty() {
                    message = message.with_tool_calls(response.tool_calls.clone());
                }
                if !response.code_executions.is_empty() {
                    message = message.with_code_executions(response.code_executions.clone());
                }
                memory.append(&session, vec![message]).await;
            })
        })))
    }

    /// Sends a turn and parses the assistant's final content as `T`. `T`'s
    /// `Deserialize` impl stands in for the caller-provided schema; on a
    /// parse failure, one repair turn is sent before surfacing
    /// [`Error::SchemaParse`].
    pub async fn send_typed<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        user_text: &str,
    ) -> Result<(T, ChatResponse)> {
        let response = self.send(cancel, user_text).await?;
        match serde_json::from_str::<T>(&response.content) {
            Ok(value) => Ok((value, response)),
            Err(first_error) => {
                let repaired = self.send(cancel, REPAIR_PROMPT).await?;
                serde_json::from_str::<T>(&repaired.content)
                    .map(|value| (value, repaired))
                    .map_err(|_| {
                        Error::schema_parse(format!(
                            "structured output invalid after repair retry (original error: {first_error})"
                        ))
                    })
            }
        }
    }
}
