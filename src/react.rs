//! The ReAct tool loop: send, dispatch any tool-calls the model asked for,
//! send a continuation turn, repeat until the provider stops or a bounded
//! number of iterations is exhausted.
//!
//! Grounded on the teacher's `Client::auto_execute_loop`, generalized from a
//! single hardcoded `ContentBlock::ToolUse` shape (plus its `hooks.rs`
//! pre/post interception, dropped here) to registry-backed dispatch against
//! the canonical [`crate::wire::ToolCallDirective`]. The teacher's iteration
//! bookkeeping (`iteration > max_iterations` checked before execution, text
//! blocks pushed to history, `self.send("")` as the continuation call) maps
//! directly onto this loop's shape.

use crate::client::{Client, REPAIR_PROMPT};
use crate::error::{Error, Result};
use crate::stream::{ChatStream, CloseGuard, StreamEvent};
use crate::tools::ToolRegistry;
use crate::wire::{ChatResponse, FinishReason, Message, Role, ToolCallDirective};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Drives a [`Client`] through the tool-call/continuation loop described in
/// the orchestration client's contract. Holds no state of its own across
/// calls - all history lives in the client's memory, so a `ReAct` can be
/// reused (or built fresh) for every call.
pub struct ReAct {
    client: Arc<Client>,
    max_iterations: u32,
}

impl ReAct {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Runs the loop to completion: send, dispatch tool-calls, continue,
    /// until the provider's response is a stop per §4.B stop semantics.
    /// Tool-calls execute before a response's content is allowed to
    /// short-circuit the loop - a response carrying both is never treated
    /// as a stop, since [`ChatResponse::is_stop`] is false whenever
    /// `tool_calls` is non-empty.
    pub async fn execute(&self, cancel: &CancellationToken, user_text: &str) -> Result<ChatResponse> {
        let mut response = self.client.send(cancel, user_text).await?;
        let mut iterations = 0u32;

        while !response.is_stop() {
            if iterations >= self.max_iterations {
                return Err(Error::tool(format!(
                    "iteration limit of {} reached before the provider stopped",
                    self.max_iterations
                )));
            }
            iterations += 1;

            let tool_messages = dispatch_tool_calls(self.client.tools(), &response.tool_calls).await;
            self.client.record(tool_messages).await;
            response = self.client.send(cancel, "").await?;
        }

        Ok(response)
    }

    /// Identical loop, but parses the terminal response's content as `T`
    /// once the loop stops, with one repair retry as in [`Client::send_typed`].
    pub async fn execute_typed<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        user_text: &str,
    ) -> Result<(T, ChatResponse)> {
        let response = self.execute(cancel, user_text).await?;
        match serde_json::from_str::<T>(&response.content) {
            Ok(value) => Ok((value, response)),
            Err(first_error) => {
                let repaired = self.client.send(cancel, REPAIR_PROMPT).await?;
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

    /// Streaming variant. Forwards every event from the current iteration's
    /// stream as it arrives, buffers tool-call deltas on the side, and at
    /// that iteration's end - if it produced tool-calls - dispatches them,
    /// emits a synthetic [`StreamEvent::IterationBoundary`], and opens the
    /// next iteration's stream. The returned [`ChatStream`] concatenates all
    /// of this into one event sequence; `collect()` on it yields the same
    /// [`ChatResponse`] shape as a plain provider stream would.
    pub async fn execute_stream(&self, cancel: CancellationToken, user_text: String) -> Result<ChatStream> {
        let first = self.client.stream(&cancel, &user_text).await?;
        let model = self.client.model().to_string();
        let (tx, rx) = mpsc::channel::<Result<StreamEvent>>(64);
        let client = self.client.clone();
        let max_iterations = self.max_iterations;

        tokio::spawn(async move {
            let mut current = first;
            let mut iteration = 0u32;

            loop {
                if cancel.is_cancelled() {
                    let _ = tx.send(Err(Error::Cancelled)).await;
                    return;
                }

                let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
                let mut finish_reason = FinishReason::Stop;
                let mut content = String::new();
                let mut reasoning = String::new();

                loop {
                    use futures::StreamExt;
                    let Some(item) = current.next().await else { break };
                    match &item {
                        Ok(StreamEvent::Content { delta }) => content.push_str(delta),
                        Ok(StreamEvent::Reasoning { delta }) => reasoning.push_str(delta),
                        Ok(StreamEvent::ToolCall { index, id, name, arguments_delta }) => {
                            let entry = pending.entry(*index).or_default();
                            if let Some(id) = id {
                                entry.id = Some(id.clone());
                            }
                            if let Some(name) = name {
                                entry.name = Some(name.clone());
                            }
                            entry.arguments.push_str(arguments_delta);
                        }
                        Ok(StreamEvent::Done { finish_reason: fr }) => finish_reason = *fr,
                        _ => {}
                    }
                    let is_err = item.is_err();
                    if tx.send(item).await.is_err() {
                        return; // consumer dropped the stream
                    }
                    if is_err {
                        return;
                    }
                }

                let directives = finalize_tool_calls(pending);

                let mut assistant_message = Message::assistant(content);
                if !reasoning.is_empty() {
                    assistant_message = assistant_message.with_reasoning(reasoning);
                }
                if !directives.is_empty() {
                    assistant_message = assistant_message.with_tool_calls(directives.clone());
                }
                client.record(vec![assistant_message]).await;

                if directives.is_empty() || finish_reason != FinishReason::ToolCalls {
                    return; // the provider stopped; nothing left to drive
                }

                iteration += 1;
                if iteration > max_iterations {
                    let _ = tx
                        .send(Err(Error::tool(format!(
                            "iteration limit of {max_iterations} reached before the provider stopped"
                        ))))
                        .await;
                    return;
                }

                if tx.send(Ok(StreamEvent::IterationBoundary { iteration })).await.is_err() {
                    return;
                }

                let tool_messages = dispatch_tool_calls(client.tools(), &directives).await;
                client.record(tool_messages).await;

                current = match client.stream(&cancel, "").await {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
            }
        });

        Ok(ChatStream::new(Box::pin(ReceiverStream::new(rx)), CloseGuard::new(), model))
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

fn finalize_tool_calls(pending: BTreeMap<u32, PendingToolCall>) -> Vec<ToolCallDirective> {
    pending
        .into_iter()
        .filter_map(|(_, call)| {
            let (Some(id), Some(name)) = (call.id, call.name) else {
                return None;
            };
            let arguments = if call.arguments.is_empty() { "{}".to_string() } else { call.arguments };
            ToolCallDirective::new(id, name, arguments).ok()
        })
        .collect()
}

/// Looks up and runs each tool-call against `tools`, producing one tool
/// message per call: the handler's stringified result, an "unknown tool"
/// error for a name with no registered handler, or a recovered panic
/// converted to a tool-error string. Never returns a library-level error -
/// per the failure-semantics contract, a handler panic is a tool error, not
/// a crate error.
async fn dispatch_tool_calls(tools: &ToolRegistry, calls: &[ToolCallDirective]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(calls.len());
    for call in calls {
        let content = match tools.get(&call.name) {
            None => format!("error: unknown tool {}", call.name),
            Some(tool) => {
                let arguments = call.parsed_arguments().unwrap_or_else(|_| serde_json::json!({}));
                match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
                    Ok(Ok(value)) => value.to_string(),
                    Ok(Err(e)) => format!("error: {e}"),
                    Err(panic) => format!("error: tool '{}' panicked: {}", call.name, panic_message(&panic)),
                }
            }
        };
        let message = Message::tool(call.id.clone(), call.name.clone(), content).unwrap_or_else(|_| Message {
            role: Some(Role::Tool),
            content: Some(format!("error: tool-call '{}' carried an empty id", call.name)),
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Default::default()
        });
        messages.push(message);
    }
    messages
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
