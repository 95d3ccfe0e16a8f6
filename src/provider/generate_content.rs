//! The "generateContent" reference provider (Gemini-shaped wire format).
//!
//! This variant has no teacher counterpart - the teacher only ever spoke
//! one OpenAI-compatible dialect. Built fresh in the same idiom as
//! [`super::chat_completion::ChatCompletionProvider`] (tagged wire structs,
//! fluent config setters), it illustrates the non-trivial translation a
//! real multi-provider core has to do: role remapping, synthetic tool-call
//! IDs, a thought-boolean reasoning split, and header (not bearer) auth.

use super::sse::{self, SseEvent};
use super::{Capabilities, Provider};
use crate::error::{Error, Result};
use crate::stream::{ChatStream, CloseGuard, StreamEvent};
use crate::wire::{
    ChatRequest, ChatResponse, ContentPart, FinishReason, MediaRef, MediaSource, Message, Role,
    ToolCallDirective, ToolChoice, ToolDescriptor,
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<WireToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireSystemInstruction {
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    inline_data: Option<WireInlineData>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "fileData")]
    file_data: Option<WireFileData>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "functionCall")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "functionResponse")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct WireToolDef {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<WireFunctionDecl>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDecl {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireToolConfig {
    #[serde(rename = "functionCallingConfig")]
    function_calling_config: WireFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct WireFunctionCallingConfig {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none", rename = "allowedFunctionNames")]
    allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Default)]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "topP")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxOutputTokens")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    candidates: Vec<WireCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<WireUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: WireContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: Option<u32>,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: Option<u32>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        // "system" is carried in the top-level systemInstruction field and
        // never appears inline; "tool" results become a "user" turn
        // carrying a functionResponse part.
        Role::System | Role::User | Role::Tool => "user",
    }
}

fn to_wire_content(msg: &Message) -> WireContent {
    let role = wire_role(msg.role.unwrap_or(Role::User));

    if msg.role == Some(Role::Tool) {
        let name = msg.name.clone().unwrap_or_default();
        let response_text = msg.content.clone().unwrap_or_default();
        return WireContent {
            role: role.to_string(),
            parts: vec![WirePart {
                function_response: Some(WireFunctionResponse {
                    name,
                    response: serde_json::json!({ "result": response_text }),
                }),
                ..Default::default()
            }],
        };
    }

    let mut parts = Vec::new();

    if let Some(content_parts) = &msg.content_parts {
        for part in content_parts {
            parts.push(to_wire_part(part));
        }
    } else if let Some(text) = &msg.content {
        if !text.is_empty() {
            parts.push(WirePart {
                text: Some(text.clone()),
                ..Default::default()
            });
        }
    }

    if let Some(calls) = &msg.tool_calls {
        for call in calls {
            let args = call.parsed_arguments().unwrap_or(Value::Object(Default::default()));
            parts.push(WirePart {
                function_call: Some(WireFunctionCall {
                    id: Some(call.id.clone()),
                    name: call.name.clone(),
                    args,
                }),
                ..Default::default()
            });
        }
    }

    WireContent {
        role: role.to_string(),
        parts,
    }
}

fn to_wire_part(part: &ContentPart) -> WirePart {
    match part {
        ContentPart::Text { text } => WirePart {
            text: Some(text.clone()),
            ..Default::default()
        },
        ContentPart::Image(media) | ContentPart::Audio(media) | ContentPart::Video(media) | ContentPart::Document(media) => {
            match &media.source {
                MediaSource::Inline { data } => WirePart {
                    inline_data: Some(WireInlineData {
                        mime_type: media.mime_type.clone(),
                        data: data.clone(),
                    }),
                    ..Default::default()
                },
                MediaSource::Uri { uri } => WirePart {
                    file_data: Some(WireFileData {
                        mime_type: media.mime_type.clone(),
                        file_uri: uri.clone(),
                    }),
                    ..Default::default()
                },
            }
        }
    }
}

fn to_wire_tool_choice(choice: &ToolChoice) -> WireToolConfig {
    let (mode, names) = match choice {
        ToolChoice::None => ("NONE", None),
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Specific(name) => ("ANY", Some(vec![name.clone()])),
        ToolChoice::AtLeastOneOf(names) => ("ANY", Some(names.clone())),
    };
    WireToolConfig {
        function_calling_config: WireFunctionCallingConfig {
            mode,
            allowed_function_names: names,
        },
    }
}

fn finish_reason_from_wire(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
        Some("STOP") | Some("OTHER") | None => FinishReason::Stop,
        Some(_) => FinishReason::Stop,
    }
}

/// Splits a candidate's parts into (reasoning, content, tool-calls, media),
/// synthesizing `call_N` IDs for any function-call part that omits one.
fn split_parts(parts: Vec<WirePart>) -> (String, String, Result<Vec<ToolCallDirective>>, Vec<MediaRef>) {
    let mut reasoning = Vec::new();
    let mut content = Vec::new();
    let mut directives = Vec::new();
    let mut media = Vec::new();
    let mut synthetic_index = 0u32;
    let mut directive_error = None;

    for part in parts {
        if let Some(text) = part.text {
            if part.thought == Some(true) {
                reasoning.push(text);
            } else {
                content.push(text);
            }
        }
        if let Some(call) = part.function_call {
            let id = call.id.unwrap_or_else(|| {
                let id = format!("call_{synthetic_index}");
                synthetic_index += 1;
                id
            });
            let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
            match ToolCallDirective::new(id, call.name, arguments) {
                Ok(d) => directives.push(d),
                Err(e) => directive_error = Some(e),
            }
        }
        if let Some(inline) = part.inline_data {
            media.push(MediaRef::inline(inline.mime_type, inline.data));
        }
        if let Some(file) = part.file_data {
            media.push(MediaRef::uri(file.mime_type, file.file_uri));
        }
    }

    let directives = match directive_error {
        Some(e) => Err(e),
        None => Ok(directives),
    };
    (reasoning.join("\n"), content.join(""), directives, media)
}

fn usage_from_wire(usage: Option<WireUsageMetadata>) -> Option<crate::wire::Usage> {
    usage.map(|u| crate::wire::Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
        cached_tokens: None,
        reasoning_tokens: None,
    })
}

/// A generateContent-style provider (Gemini and API-compatible endpoints).
pub struct GenerateContentProvider {
    model: String,
    base_url: String,
    api_key: String,
    auth_header: String,
    http: reqwest::Client,
}

impl GenerateContentProvider {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: String::new(),
            auth_header: "x-goog-api-key".to_string(),
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

    /// Overrides the header name carrying the API key. Authentication is
    /// via a provider-specific header, never a bearer token.
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    fn endpoint(&self, streaming: bool) -> String {
        let action = if streaming { "streamGenerateContent" } else { "generateContent" };
        let alt = if streaming { "&alt=sse" } else { "" };
        format!(
            "{}/models/{}:{action}?key={}{alt}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        )
    }

    fn build_request(&self, request: &ChatRequest) -> WireRequest {
        let contents = request.messages.iter().map(to_wire_content).collect();
        let system_instruction = request.system_prompt.as_ref().map(|s| WireSystemInstruction {
            parts: vec![WirePart {
                text: Some(s.clone()),
                ..Default::default()
            }],
        });
        let tools = request.tools.as_ref().map(|tools: &Vec<ToolDescriptor>| {
            vec![WireToolDef {
                function_declarations: tools
                    .iter()
                    .map(|t| WireFunctionDecl {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }]
        });
        let generation_config = Some(WireGenerationConfig {
            temperature: request.generation.temperature,
            top_p: request.generation.top_p,
            max_output_tokens: request.generation.max_output_tokens,
        });

        WireRequest {
            contents,
            system_instruction,
            tools,
            tool_config: request.tool_choice.as_ref().map(to_wire_tool_choice),
            generation_config,
        }
    }

    async fn post(&self, streaming: bool, body: &WireRequest, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let send = self
            .http
            .post(self.endpoint(streaming))
            .header(&self.auth_header, &self.api_key)
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
impl Provider for GenerateContentProvider {
    async fn send(&self, cancel: &CancellationToken, request: ChatRequest) -> Result<ChatResponse> {
        let wire_request = self.build_request(&request);
        let response = self.post(false, &wire_request, cancel).await?;
        let parsed: WireResponse = response.json().await.map_err(Error::Http)?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::decode("generateContent response had no candidates"))?;

        let finish_reason = finish_reason_from_wire(candidate.finish_reason.as_deref());
        let (reasoning, content, directives, media) = split_parts(candidate.content.parts);
        let directives = directives?;

        let mut out = ChatResponse::new(String::new(), self.model.clone(), finish_reason, content, directives);
        if !reasoning.is_empty() {
            out.reasoning = Some(reasoning);
        }
        out.route_media(media);
        out.usage = usage_from_wire(parsed.usage_metadata);
        Ok(out)
    }

    async fn stream(&self, cancel: &CancellationToken, request: ChatRequest) -> Result<ChatStream> {
        let wire_request = self.build_request(&request);
        let response = self.post(true, &wire_request, cancel).await?;

        let guard = CloseGuard::new();
        let model = self.model.clone();
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
                let parsed: WireResponse = match serde_json::from_str(&event.data) {
                    Ok(r) => r,
                    Err(e) => return vec![Err(Error::decode(format!("malformed stream frame: {e}")))],
                };
                let mut out = Vec::new();
                for candidate in parsed.candidates {
                    let finish_reason = candidate.finish_reason.clone();
                    let (reasoning, content, directives, media) = split_parts(candidate.content.parts);
                    if !reasoning.is_empty() {
                        out.push(Ok(StreamEvent::Reasoning { delta: reasoning }));
                    }
                    if !content.is_empty() {
                        out.push(Ok(StreamEvent::Content { delta: content }));
                    }
                    match directives {
                        Ok(directives) => {
                            for (i, d) in directives.into_iter().enumerate() {
                                out.push(Ok(StreamEvent::ToolCall {
                                    index: i as u32,
                                    id: Some(d.id),
                                    name: Some(d.name),
                                    arguments_delta: d.arguments,
                                }));
                            }
                        }
                        Err(e) => out.push(Err(e)),
                    }
                    for m in media {
                        out.push(Ok(StreamEvent::Media(m)));
                    }
                    if let Some(reason) = finish_reason {
                        out.push(Ok(StreamEvent::Done {
                            finish_reason: finish_reason_from_wire(Some(&reason)),
                        }));
                    }
                }
                if let Some(usage) = usage_from_wire(parsed.usage_metadata) {
                    out.push(Ok(StreamEvent::Usage(usage)));
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
            image_output: true,
            audio_output: true,
            streaming: true,
            reasoning: true,
            built_in_tools: true,
            function_calling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ToolChoice;

    #[test]
    fn role_mapping_follows_the_translation_rules() {
        assert_eq!(wire_role(Role::Assistant), "model");
        assert_eq!(wire_role(Role::User), "user");
        assert_eq!(wire_role(Role::System), "user");
    }

    #[test]
    fn tool_message_becomes_user_function_response() {
        let msg = Message::tool("c1", "lookup", "42").unwrap();
        let wire = to_wire_content(&msg);
        assert_eq!(wire.role, "user");
        assert!(wire.parts[0].function_response.is_some());
    }

    #[test]
    fn tool_choice_maps_to_function_calling_modes() {
        assert_eq!(to_wire_tool_choice(&ToolChoice::None).function_calling_config.mode, "NONE");
        assert_eq!(to_wire_tool_choice(&ToolChoice::Auto).function_calling_config.mode, "AUTO");
        assert_eq!(to_wire_tool_choice(&ToolChoice::Required).function_calling_config.mode, "ANY");
        let specific = to_wire_tool_choice(&ToolChoice::Specific("x".into()));
        assert_eq!(specific.function_calling_config.allowed_function_names, Some(vec!["x".into()]));
    }

    #[test]
    fn finish_reason_normalization_matches_spec_table() {
        assert_eq!(finish_reason_from_wire(Some("STOP")), FinishReason::Stop);
        assert_eq!(finish_reason_from_wire(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(finish_reason_from_wire(Some("SAFETY")), FinishReason::ContentFilter);
        assert_eq!(finish_reason_from_wire(Some("RECITATION")), FinishReason::ContentFilter);
        assert_eq!(finish_reason_from_wire(Some("OTHER")), FinishReason::Stop);
    }

    #[test]
    fn reasoning_parts_split_from_content_by_thought_flag() {
        let parts = vec![
            WirePart {
                text: Some("thinking...".into()),
                thought: Some(true),
                ..Default::default()
            },
            WirePart {
                text: Some("the answer".into()),
                ..Default::default()
            },
        ];
        let (reasoning, content, directives, _media) = split_parts(parts);
        assert_eq!(reasoning, "thinking...");
        assert_eq!(content, "the answer");
        assert!(directives.unwrap().is_empty());
    }

    #[test]
    fn function_call_parts_get_synthetic_ids_when_missing() {
        let parts = vec![
            WirePart {
                function_call: Some(WireFunctionCall {
                    id: None,
                    name: "search".into(),
                    args: serde_json::json!({"q": "rust"}),
                }),
                ..Default::default()
            },
            WirePart {
                function_call: Some(WireFunctionCall {
                    id: None,
                    name: "lookup".into(),
                    args: serde_json::json!({}),
                }),
                ..Default::default()
            },
        ];
        let (_, _, directives, _) = split_parts(parts);
        let directives = directives.unwrap();
        assert_eq!(directives[0].id, "call_0");
        assert_eq!(directives[1].id, "call_1");
    }

    #[test]
    fn media_parts_route_by_top_level_mime_type() {
        let parts = vec![WirePart {
            inline_data: Some(WireInlineData {
                mime_type: "audio/mp3".into(),
                data: "base64data".into(),
            }),
            ..Default::default()
        }];
        let (_, _, _, media) = split_parts(parts);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].top_level_type(), "audio");
    }
}
