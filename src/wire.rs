//! Canonical wire model: the provider-neutral shape every `Provider`
//! translates to and from.
//!
//! Every field here is optional unless noted otherwise; absent fields
//! serialize as omitted (`#[serde(skip_serializing_if = "Option::is_none")]`
//! throughout). The model is built to round-trip everything a multi-turn
//! conversation needs to replay faithfully: content parts, tool-calls,
//! reasoning, refusals, and code-execution records, in original order.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Where a media part's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaSource {
    /// Base64-encoded bytes carried inline.
    Inline { data: String },
    /// A reference to externally hosted bytes.
    Uri { uri: String },
}

/// A single piece of multimodal content. When both an inline payload and a
/// URI would be present for the same part, encoders MUST prefer the URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub mime_type: String,
    pub source: MediaSource,
}

impl MediaRef {
    pub fn inline(mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: MediaSource::Inline {
                data: base64_data.into(),
            },
        }
    }

    pub fn uri(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: MediaSource::Uri { uri: uri.into() },
        }
    }

    /// The MIME top-level type (`"image"`, `"audio"`, `"video"`, ...), used
    /// to bucket response media by kind.
    pub fn top_level_type(&self) -> &str {
        self.mime_type.split('/').next().unwrap_or("")
    }
}

/// One piece of ordered, tagged content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(MediaRef),
    Audio(MediaRef),
    Video(MediaRef),
    Document(MediaRef),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A structured directive emitted by the model requesting invocation of a
/// registered tool. `arguments` MUST be a syntactically valid JSON object
/// string — enforced at construction time so malformed directives never
/// enter history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDirective {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallDirective {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Result<Self> {
        let arguments = arguments.into();
        let parsed: Value = serde_json::from_str(&arguments)
            .map_err(|e| Error::invalid_input(format!("tool-call arguments must be valid JSON: {e}")))?;
        if !parsed.is_object() {
            return Err(Error::invalid_input(
                "tool-call arguments must be a JSON object",
            ));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }

    /// Parses the stored argument string into a JSON object value.
    pub fn parsed_arguments(&self) -> Result<Value> {
        serde_json::from_str(&self.arguments)
            .map_err(|e| Error::decode(format!("tool-call arguments no longer valid JSON: {e}")))
    }
}

/// The outcome of a single code-execution step surfaced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExecutionRecord {
    pub language: String,
    pub code: String,
    pub outcome: String,
    pub output: String,
}

/// A turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Message {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub content_parts: Option<Vec<ContentPart>>,
    pub tool_calls: Option<Vec<ToolCallDirective>>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
    pub reasoning: Option<String>,
    pub refusal: Option<String>,
    pub code_executions: Option<Vec<CodeExecutionRecord>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A user turn carrying content parts instead of plain text. Per the
    /// data model, parts take precedence over `content` when both are set.
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Some(Role::User),
            content_parts: Some(parts),
            ..Default::default()
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::System),
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A tool-result turn. `tool_call_id` MUST reference an earlier
    /// assistant tool-call and MUST be non-empty.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let tool_call_id = tool_call_id.into();
        if tool_call_id.is_empty() {
            return Err(Error::invalid_input(
                "tool message requires a non-empty tool_call_id",
            ));
        }
        Ok(Self {
            role: Some(Role::Tool),
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id),
            name: Some(name.into()),
            ..Default::default()
        })
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallDirective>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    pub fn with_code_executions(mut self, records: Vec<CodeExecutionRecord>) -> Self {
        self.code_executions = Some(records);
        self
    }

    /// The effective text content: `content_parts`' text parts joined if
    /// present, else plain `content`.
    pub fn effective_text(&self) -> String {
        if let Some(parts) = &self.content_parts {
            parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("")
        } else {
            self.content.clone().unwrap_or_default()
        }
    }
}

/// Per-request generation tuning. Every field is provider-optional; a
/// provider that doesn't support a field simply drops it on encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub reasoning_budget: Option<u32>,
    pub include_thoughts: Option<bool>,
    pub safety_settings: Option<Vec<(String, String)>>,
    pub response_modalities: Option<Vec<String>>,
}

/// A caller-level policy for whether/which tools the model should call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Specific(String),
    AtLeastOneOf(Vec<String>),
}

/// Name/description/schema triple describing a callable tool to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The input envelope sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDescriptor>>,
    pub tool_choice: Option<ToolChoice>,
    pub generation: GenerationConfig,
    pub response_format: Option<Value>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub index: usize,
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub source_indices: Vec<usize>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroundingMetadata {
    pub search_queries: Vec<String>,
    pub sources: Vec<GroundingSource>,
    pub citations: Vec<Citation>,
    pub url_context_sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
}

/// The output envelope returned by a provider.
///
/// Invariant: if `tool_calls` is non-empty, `finish_reason` is always
/// `ToolCalls`, regardless of what the wire actually said — enforced in
/// [`ChatResponse::new`] and [`ChatResponse::finalize`], never left to
/// callers to remember.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub finish_reason: FinishReason,
    pub content: String,
    pub reasoning: Option<String>,
    pub refusal: Option<String>,
    pub tool_calls: Vec<ToolCallDirective>,
    pub images: Vec<MediaRef>,
    pub audio: Vec<MediaRef>,
    pub videos: Vec<MediaRef>,
    pub code_executions: Vec<CodeExecutionRecord>,
    pub grounding: Option<GroundingMetadata>,
    pub usage: Option<Usage>,
}

impl ChatResponse {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        finish_reason: FinishReason,
        content: impl Into<String>,
        tool_calls: Vec<ToolCallDirective>,
    ) -> Self {
        let finish_reason = if tool_calls.is_empty() {
            finish_reason
        } else {
            FinishReason::ToolCalls
        };
        Self {
            id: id.into(),
            model: model.into(),
            finish_reason,
            content: content.into(),
            reasoning: None,
            refusal: None,
            tool_calls,
            images: Vec::new(),
            audio: Vec::new(),
            videos: Vec::new(),
            code_executions: Vec::new(),
            grounding: None,
            usage: None,
        }
    }

    /// Routes a flat list of output media parts into the images/audio/video
    /// buckets by MIME top-level type, per §4.A's media-routing invariant.
    pub fn route_media(&mut self, parts: Vec<MediaRef>) {
        for part in parts {
            match part.top_level_type() {
                "audio" => self.audio.push(part),
                "video" => self.videos.push(part),
                _ => self.images.push(part),
            }
        }
    }

    /// Whether this response is a "stop" per the default provider-contract
    /// stop predicate in §4.B: no tool-calls, and either an explicit
    /// terminal finish reason or genuinely empty output.
    pub fn is_stop(&self) -> bool {
        if !self.tool_calls.is_empty() {
            return false;
        }
        matches!(
            self.finish_reason,
            FinishReason::Stop | FinishReason::Length | FinishReason::ContentFilter
        ) || (self.content.is_empty() && self.images.is_empty() && self.audio.is_empty() && self.videos.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_directive_rejects_non_object_arguments() {
        assert!(ToolCallDirective::new("c1", "add", "[1,2]").is_err());
        assert!(ToolCallDirective::new("c1", "add", "not json").is_err());
        assert!(ToolCallDirective::new("c1", "add", r#"{"a":1}"#).is_ok());
    }

    #[test]
    fn tool_message_rejects_empty_tool_call_id() {
        assert!(Message::tool("", "add", "42").is_err());
        assert!(Message::tool("c1", "add", "42").is_ok());
    }

    #[test]
    fn tool_calls_present_coerces_finish_reason() {
        let call = ToolCallDirective::new("c1", "add", "{}").unwrap();
        let resp = ChatResponse::new("r1", "m1", FinishReason::Stop, "", vec![call]);
        assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn media_routes_by_mime_top_level_type() {
        let mut resp = ChatResponse::new("r1", "m1", FinishReason::Stop, "ok", vec![]);
        resp.route_media(vec![
            MediaRef::uri("image/png", "http://x/1.png"),
            MediaRef::uri("audio/mp3", "http://x/1.mp3"),
            MediaRef::uri("video/mp4", "http://x/1.mp4"),
        ]);
        assert_eq!(resp.images.len(), 1);
        assert_eq!(resp.audio.len(), 1);
        assert_eq!(resp.videos.len(), 1);
    }

    #[test]
    fn stop_semantics_default() {
        let stopped = ChatResponse::new("r", "m", FinishReason::Stop, "hi", vec![]);
        assert!(stopped.is_stop());

        let call = ToolCallDirective::new("c1", "add", "{}").unwrap();
        let with_tools = ChatResponse::new("r", "m", FinishReason::Stop, "", vec![call]);
        assert!(!with_tools.is_stop());

        let empty = ChatResponse::new("r", "m", FinishReason::Error, "", vec![]);
        assert!(empty.is_stop());
    }

    #[test]
    fn effective_text_prefers_parts_over_content() {
        let msg = Message {
            content: Some("plain".into()),
            content_parts: Some(vec![ContentPart::text("from parts")]),
            ..Message::user("plain")
        };
        assert_eq!(msg.effective_text(), "from parts");
    }
}
