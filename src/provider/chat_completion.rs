//! The "chat-completion" reference provider: a flat ordered message list,
//! typed `function` tool definitions, and tool-calls returned as complete
//! records with JSON-string arguments. This is the teacher's own wire
//! shape (`OpenAI*` in its `types.rs`), generalized to translate through
//! the canonical [`crate::wire`] types instead of being them directly.

use super::sse::{self, SseEvent};
use super::{Capabilities, Provider};
use crate::error::{Error, Result};
use crate::stream::{ChatStream, CloseGuard, StreamEvent};
use crate::wire::{
    ChatRequest, ChatResponse, ContentPart, FinishReason, Message, Role, ToolCallDirective,
    ToolChoice, ToolDescriptor,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WireContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireToolDef {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunction,
}

#[derive(Debug, Deserialize)]
struct WireResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    id: String,
    model: String,
    choices: Vec<WireChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn finish_reason_from_wire(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn to_wire_message(msg: &Message) -> WireMessage {
    let role = role_str(msg.role.unwrap_or(Role::User));

    let content = if let Some(parts) = &msg.content_parts {
        let parts: Vec<WireContentPart> = parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(WireContentPart::Text { text: text.clone() }),
                ContentPart::Image(media) => Some(WireContentPart::ImageUrl {
                    image_url: WireImageUrl {
                        url: match &media.source {
                            crate::wire::MediaSource::Uri { uri } => uri.clone(),
                            crate::wire::MediaSource::Inline { data } => {
                                format!("data:{};base64,{}", media.mime_type, data)
                            }
                        },
                    },
                }),
                _ => None,
            })
            .collect();
        Some(WireContent::Parts(parts))
    } else {
        msg.content.clone().map(WireContent::Text)
    };

    let tool_calls = msg.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|c| WireToolCall {
                id: c.id.clone(),
                call_type: "function",
                function: WireFunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                },
            })
            .collect()
    });

    WireMessage {
        role,
        content,
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
    }
}

fn to_wire_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".into()),
        ToolChoice::None => Value::String("none".into()),
        ToolChoice::Required => Value::String("required".into()),
        ToolChoice::Specific(name) => {
            serde_json::json!({"type": "function", "function": {"name": name}})
        }
        // the chat-completion wire style has no native "at least one of N"
        // policy; the closest faithful mapping is "required" and let the
        // model pick among the tools actually sent.
        ToolChoice::AtLeastOneOf(_) => Value::String("required".into()),
    }
}

fn build_request(model: &str, request: &ChatRequest, stream: bool) -> WireRequest {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(WireMessage {
            role: "system",
            content: Some(WireContent::Text(system.clone())),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    messages.extend(request.messages.iter().map(to_wire_message));

    let tools = request.tools.as_ref().map(|tools: &Vec<ToolDescriptor>| {
        tools
            .iter()
            .map(|t| WireToolDef {
                kind: "function",
                function: WireFunctionDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    });

    WireRequest {
        model: model.to_string(),
        messages,
        stream,
        max_tokens: request.generation.max_output_tokens,
        temperature: request.generation.temperature,
        top_p: request.generation.top_p,
        tools,
        tool_choice: request.tool_choice.as_ref().map(to_wire_tool_choice),
    }
}

fn directives_from_wire(calls: &[WireResponseToolCall]) -> Result<Vec<ToolCallDirective>> {
    calls
        .iter()
        .map(|c| ToolCallDirective::new(c.id.clone(), c.function.name.clone(), c.function.arguments.clone()))
        .collect()
}

fn usage_from_wire(usage: Option<WireUsage>) -> Option<crate::wire::Usage> {
    usage.map(|u| crate::wire::Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
        cached_tokens: None,
        reasoning_tokens: None,
    })
}

/// A chat-completion-style provider (OpenAI and any API-compatible
/// endpoint: LM Studio, Ollama's OpenAI shim, vLLM, etc).
pub struct ChatCompletionProvider {
    model: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl ChatCompletionProvider {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: String::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, body: &WireRequest, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let send = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send();

        let response = tokio::select! {
            result = send => result.map_err(Error::Http)?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(Some(status), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for ChatCompletionProvider {
    async fn send(&self, cancel: &CancellationToken, request: ChatRequest) -> Result<ChatResponse> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let wire_request = build_request(&model, &request, false);
        let response = self.post(&wire_request, cancel).await?;
        let parsed: WireResponse = response.json().await.map_err(Error::Http)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::decode("chat-completion response had no choices"))?;

        let tool_calls = directives_from_wire(choice.message.tool_calls.as_deref().unwrap_or_default())?;
        let finish_reason = finish_reason_from_wire(choice.finish_reason.as_deref());
        let mut out = ChatResponse::new(
            parsed.id,
            parsed.model,
            finish_reason,
            choice.message.content.unwrap_or_default(),
            tool_calls,
        );
        out.usage = usage_from_wire(parsed.usage);
        Ok(out)
    }

    async fn stream(&self, cancel: &CancellationToken, request: ChatRequest) -> Result<ChatStream> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let wire_request = build_request(&model, &request, true);
        let response = self.post(&wire_request, cancel).await?;

        let guard = CloseGuard::new();
        let events = sse::scan(response);
        let cancel = cancel.clone();
        let translated = events.take_while(move |_| futures::future::ready(!cancel.is_cancelled())).map(
            |event: Result<SseEvent>| -> Vec<Result<StreamEvent>> {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => return vec![Err(e)],
                };
                if event.is_done_sentinel() {
                    return Vec::new();
                }
                let chunk: WireChunk = match serde_json::from_str(&event.data) {
                    Ok(c) => c,
                    Err(e) => return vec![Err(Error::decode(format!("malformed stream chunk: {e}")))],
                };
                let mut out = Vec::new();
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            out.push(Ok(StreamEvent::Content { delta: content }));
                        }
                    }
                    if let Some(calls) = choice.delta.tool_calls {
                        for call in calls {
                            out.push(Ok(StreamEvent::ToolCall {
                                index: call.index,
                                id: call.id,
                                name: call.function.as_ref().and_then(|f| f.name.clone()),
                                arguments_delta: call
                                    .function
                                    .and_then(|f| f.arguments)
                                    .unwrap_or_default(),
                            }));
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        out.push(Ok(StreamEvent::Done {
                            finish_reason: finish_reason_from_wire(Some(&reason)),
                        }));
                    }
                }
                if let Some(usage) = chunk.usage {
                    if let Some(usage) = usage_from_wire(Some(usage)) {
                        out.push(Ok(StreamEvent::Usage(usage)));
                    }
                }
                out
            },
        );
        let flattened = translated.flat_map(futures::stream::iter);
        Ok(ChatStream::new(Box::pin(flattened), guard, model))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multimodal_input: true,
            image_output: false,
            audio_output: false,
            streaming: true,
            reasoning: false,
            built_in_tools: false,
            function_calling: true,
        }
    }
}
