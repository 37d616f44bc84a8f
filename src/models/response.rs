//! Anthropic Messages API response types.

use serde::{Deserialize, Serialize};

use super::content::ContentBlock;
use super::request::Role;

/// Response from the Messages API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesResponse {
    /// Unique identifier (`msg_…`).
    pub id: String,

    /// Always `"message"`.
    #[serde(rename = "type", default = "default_message_type")]
    pub response_type: String,

    /// Always `assistant`.
    pub role: Role,

    /// The model that was requested.
    pub model: String,

    /// The generated content blocks.
    pub content: Vec<ContentBlock>,

    /// Why generation stopped.
    pub stop_reason: Option<StopReason>,

    /// Stop sequence that fired, when `stop_reason` is `stop_sequence`.
    pub stop_sequence: Option<String>,

    /// Token accounting.
    pub usage: Usage,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl MessagesResponse {
    /// Create a new response.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: Option<StopReason>,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            response_type: "message".to_string(),
            role: Role::Assistant,
            model: model.into(),
            content,
            stop_reason,
            stop_sequence: None,
            usage,
        }
    }

    /// Concatenate all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| b.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check if the response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(|b| b.is_tool_use())
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished naturally.
    EndTurn,
    /// Hit the output-token limit.
    MaxTokens,
    /// A stop sequence fired.
    StopSequence,
    /// The model wants to use a tool.
    ToolUse,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
            StopReason::ToolUse => write!(f, "tool_use"),
        }
    }
}

/// Token accounting.
///
/// All four fields are always serialized; absent upstream counts
/// default to zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    /// Prompt tokens billed (cache reads excluded).
    pub input_tokens: u32,

    /// Completion tokens.
    pub output_tokens: u32,

    /// Tokens written to the prompt cache.
    #[serde(default)]
    pub cache_creation_input_tokens: u32,

    /// Tokens read from the prompt cache.
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

impl Usage {
    /// Create a usage record with no cache traffic.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization_shape() {
        let response = MessagesResponse::new(
            "msg_123",
            "claude-sonnet-4-5",
            vec![ContentBlock::text("Hi!")],
            Some(StopReason::EndTurn),
            Usage::new(10, 5),
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], "msg_123");
        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["stop_reason"], "end_turn");
        assert!(json["stop_sequence"].is_null());
        assert_eq!(json["usage"]["input_tokens"], 10);
        assert_eq!(json["usage"]["output_tokens"], 5);
        assert_eq!(json["usage"]["cache_read_input_tokens"], 0);
        assert_eq!(json["usage"]["cache_creation_input_tokens"], 0);
    }

    #[test]
    fn test_stop_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&StopReason::EndTurn).unwrap(),
            r#""end_turn""#
        );
        assert_eq!(
            serde_json::to_string(&StopReason::MaxTokens).unwrap(),
            r#""max_tokens""#
        );
        assert_eq!(
            serde_json::to_string(&StopReason::ToolUse).unwrap(),
            r#""tool_use""#
        );
    }

    #[test]
    fn test_text_concatenation() {
        let response = MessagesResponse::new(
            "msg_1",
            "m",
            vec![ContentBlock::text("a"), ContentBlock::text("b")],
            None,
            Usage::default(),
        );
        assert_eq!(response.text(), "a\nb");
    }

    #[test]
    fn test_has_tool_calls() {
        let response = MessagesResponse::new(
            "msg_1",
            "m",
            vec![ContentBlock::tool_use("toolu_1", "t", serde_json::json!({}))],
            Some(StopReason::ToolUse),
            Usage::default(),
        );
        assert!(response.has_tool_calls());
    }
}
