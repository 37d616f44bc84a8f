//! Google Generative AI / Cloud Code wire types.
//!
//! These shapes are internal: they are produced by [`crate::convert`] and
//! consumed by [`crate::transport`]; they never appear on the inbound API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body in Google Generative AI format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    /// The conversation contents.
    pub contents: Vec<Content>,

    /// Generation configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,

    /// System instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,

    /// Tool-choice configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,

    /// Thinking configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,

    /// Session ID for upstream cache continuity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl GoogleRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request with contents only.
    pub fn with_contents(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }
}

/// Content (one conversational turn or the system instruction).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// `"user"` or `"model"`; absent on the system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Create user content.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    /// Create model content.
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
        }
    }

    /// Create a system instruction (no role).
    pub fn system(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }
}

/// A part of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Marks a thought/thinking part.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,

    /// Thought signature (Gemini thinking continuity).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,

    /// Function call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// Function response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,

    /// Base64-embedded bytes (images, documents).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,

    /// URL-referenced bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Create a thought part with an optional signature.
    pub fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: Some(true),
            thought_signature: signature,
            ..Self::default()
        }
    }

    /// Create a function-call part.
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    /// Create a function-response part.
    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }

    /// Create an inline-data part.
    pub fn inline_data(data: InlineData) -> Self {
        Self {
            inline_data: Some(data),
            ..Self::default()
        }
    }

    /// Create a file-data part.
    pub fn file_data(data: FileData) -> Self {
        Self {
            file_data: Some(data),
            ..Self::default()
        }
    }

    /// Check if this is a thought part.
    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

/// A function call issued by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Function name.
    pub name: String,

    /// Arguments as JSON.
    #[serde(default)]
    pub args: Value,

    /// Call id; only sent to Claude destinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionCall {
    /// Create a function call.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
            id: None,
        }
    }
}

/// A function response sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    /// Name of the call being answered (the tool_use id, or `"unknown"`).
    pub name: String,

    /// Response payload.
    pub response: FunctionResponseData,

    /// Call id; only sent to Claude destinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionResponse {
    /// Create a function response.
    pub fn new(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: FunctionResponseData {
                result: result.into(),
            },
            id: None,
        }
    }
}

/// Payload of a function response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponseData {
    /// The tool result text.
    pub result: String,
}

/// Base64-embedded bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type.
    pub mime_type: String,

    /// Base64-encoded payload.
    pub data: String,
}

impl InlineData {
    /// Create inline data.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// URL-referenced bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// MIME type.
    pub mime_type: String,

    /// The URL.
    pub file_uri: String,
}

impl FileData {
    /// Create file data.
    pub fn new(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            file_uri: file_uri.into(),
        }
    }
}

/// Generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Maximum output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Tool definitions wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    /// All function declarations.
    pub function_declarations: Vec<FunctionDeclaration>,
}

impl GoogleTool {
    /// Create a tool with function declarations.
    pub fn new(declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations: declarations,
        }
    }
}

/// A single declared function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    /// Function name.
    pub name: String,

    /// Description, copied verbatim from the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Sanitized parameter schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl FunctionDeclaration {
    /// Create a function declaration.
    pub fn new(name: impl Into<String>, description: Option<String>, parameters: Option<Value>) -> Self {
        Self {
            name: name.into(),
            description,
            parameters,
        }
    }
}

/// Tool-choice configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Function-calling mode.
    pub function_calling_config: FunctionCallingConfig,
}

impl ToolConfig {
    /// `AUTO` mode.
    pub fn auto() -> Self {
        Self::mode("AUTO")
    }

    /// `ANY` mode.
    pub fn any() -> Self {
        Self::mode("ANY")
    }

    /// `NONE` mode.
    pub fn none() -> Self {
        Self::mode("NONE")
    }

    /// Force a specific function.
    pub fn force(function_name: impl Into<String>) -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: Some(vec![function_name.into()]),
            },
        }
    }

    fn mode(mode: &str) -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: mode.to_string(),
                allowed_function_names: None,
            },
        }
    }
}

/// Function-calling mode and allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    /// `AUTO`, `ANY`, or `NONE`.
    pub mode: String,

    /// Allow-list when forcing specific functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Thinking configuration.
///
/// The upstream expects different key casing per model family: Claude
/// models take `include_thoughts`/`thinking_budget`, Gemini models take
/// `includeThoughts`/`thinkingBudget`. Both spellings live here as
/// optional fields; the per-family constructors fill exactly one set.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GoogleThinkingConfig {
    /// Claude-family key.
    #[serde(rename = "include_thoughts", skip_serializing_if = "Option::is_none")]
    pub claude_include_thoughts: Option<bool>,

    /// Claude-family key.
    #[serde(rename = "thinking_budget", skip_serializing_if = "Option::is_none")]
    pub claude_thinking_budget: Option<u32>,

    /// Gemini-family key.
    #[serde(rename = "includeThoughts", skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,

    /// Gemini-family key.
    #[serde(rename = "thinkingBudget", skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

impl GoogleThinkingConfig {
    /// Thinking config for a Claude destination.
    pub fn claude(budget: u32) -> Self {
        Self {
            claude_include_thoughts: Some(true),
            claude_thinking_budget: Some(budget),
            ..Self::default()
        }
    }

    /// Thinking config for a Gemini destination.
    pub fn gemini(budget: u32) -> Self {
        Self {
            include_thoughts: Some(true),
            thinking_budget: Some(budget),
            ..Self::default()
        }
    }
}

/// Response body from the upstream.
///
/// The Cloud Code endpoint sometimes nests the generative payload under a
/// `response` key; [`GoogleResponse::inner`] flattens both shapes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    /// Nested payload, when wrapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Box<GoogleResponse>>,

    /// Generated candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,

    /// Usage metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// Model version echo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GoogleResponse {
    /// Flatten the wrapped-or-flat shapes to the payload-bearing level.
    pub fn inner(&self) -> &GoogleResponse {
        self.response.as_deref().unwrap_or(self)
    }

    /// Parts of the first candidate, if any.
    pub fn first_candidate_parts(&self) -> &[Part] {
        self.inner()
            .candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Finish reason of the first candidate, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.inner()
            .candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// A generated candidate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Finish reason (`STOP`, `MAX_TOKENS`, `TOOL_USE`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Candidate index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Prompt token count.
    #[serde(default)]
    pub prompt_token_count: u32,

    /// Candidate token count.
    #[serde(default)]
    pub candidates_token_count: u32,

    /// Total token count.
    #[serde(default)]
    pub total_token_count: u32,

    /// Cached prompt tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u32>,

    /// Thinking-trace tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u32>,
}

/// Outer wrapper required by the Cloud Code endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeWrapper {
    /// Project ID.
    pub project: String,

    /// Model name.
    pub model: String,

    /// The generative request.
    pub request: GoogleRequest,

    /// Fixed client identity.
    pub user_agent: String,

    /// Fixed request classification.
    pub request_type: String,

    /// Unique request id (`agent-<uuid>`).
    pub request_id: String,
}

impl CloudCodeWrapper {
    /// Wrap a request for the Cloud Code endpoint.
    pub fn new(project: impl Into<String>, model: impl Into<String>, request: GoogleRequest) -> Self {
        Self {
            project: project.into(),
            model: model.into(),
            request,
            user_agent: "antigravity".to_string(),
            request_type: "agent".to_string(),
            request_id: format!("agent-{}", uuid::Uuid::new_v4()),
        }
    }
}
