//! Anthropic Messages API request types.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentBlock;
use super::tools::{Tool, ToolChoice};

/// A request to the Messages API.
///
/// This is the inbound shape the proxy accepts; it is converted to the
/// Google Generative AI format before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesRequest {
    /// The model to use for generation.
    pub model: String,

    /// The messages in the conversation.
    pub messages: Vec<Message>,

    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System prompt: a string or an array of text blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Stop sequences that end generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Tools available to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// How the model should choose tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Thinking/reasoning configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,

    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Request metadata, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_max_tokens() -> u32 {
    4096
}

impl MessagesRequest {
    /// Create a simple request with one user message.
    pub fn simple(model: impl Into<String>, max_tokens: u32, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(content)],
            max_tokens,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: None,
            metadata: None,
        }
    }

    /// Check if this request has streaming enabled.
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Check if this request carries any tools.
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Get the thinking budget if configured.
    pub fn thinking_budget(&self) -> Option<u32> {
        self.thinking.as_ref().and_then(|t| t.budget_tokens)
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role of the sender.
    pub role: Role,

    /// The content: a bare string or an array of blocks.
    pub content: MessageContent,
}

impl Message {
    /// Create a user message with text content.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with content blocks.
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message with content blocks.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Check if this is a user message.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Check if this is an assistant message.
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Get the content blocks if the message has blocks.
    pub fn as_blocks(&self) -> Option<&[ContentBlock]> {
        match &self.content {
            MessageContent::Blocks(blocks) => Some(blocks),
            _ => None,
        }
    }

    /// Check if this message contains any tool_use blocks.
    pub fn has_tool_use(&self) -> bool {
        self.as_blocks()
            .is_some_and(|blocks| blocks.iter().any(|b| b.is_tool_use()))
    }

    /// Check if this message contains any tool_result blocks.
    pub fn has_tool_result(&self) -> bool {
        self.as_blocks()
            .is_some_and(|blocks| blocks.iter().any(|b| b.is_tool_result()))
    }
}

/// Role of a message sender.
///
/// The upstream role `"model"` is accepted as an alias for `assistant`
/// so that histories captured on the Google side replay cleanly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    /// User message.
    #[serde(rename = "user")]
    User,
    /// Assistant message.
    #[serde(rename = "assistant", alias = "model")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Content of a message: a bare string or an array of blocks.
///
/// `null` elements inside a block array are dropped during
/// deserialization rather than rejected; clients emit them.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Block array content.
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Get the text if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the blocks if this is block content.
    pub fn as_blocks(&self) -> Option<&[ContentBlock]> {
        match self {
            MessageContent::Blocks(blocks) => Some(blocks),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(text) => Ok(MessageContent::Text(text)),
            Value::Array(items) => {
                let mut blocks = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        continue;
                    }
                    let block =
                        serde_json::from_value::<ContentBlock>(item).map_err(de::Error::custom)?;
                    blocks.push(block);
                }
                Ok(MessageContent::Blocks(blocks))
            }
            other => Err(de::Error::custom(format!(
                "content must be a string or an array of blocks, got {other}"
            ))),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

/// System prompt: a string or an array of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Simple text system prompt.
    Text(String),
    /// Block-structured system prompt (prompt-caching shape).
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Collect all text content from this system prompt.
    pub fn text_content(&self) -> String {
        match self {
            SystemPrompt::Text(text) => text.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .map(|b| {
                    let SystemBlock::Text { text, .. } = b;
                    text.as_str()
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for SystemPrompt {
    fn from(text: &str) -> Self {
        SystemPrompt::Text(text.to_string())
    }
}

/// A block in a block-structured system prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    /// Text content with optional prompt-caching marker.
    Text {
        /// The text.
        text: String,
        /// Prompt-caching marker, passed through untouched.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },
}

impl SystemBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        SystemBlock::Text {
            text: text.into(),
            cache_control: None,
        }
    }
}

/// Thinking/reasoning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ThinkingConfig {
    /// Requested thinking type (`enabled`/`disabled`); informational.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub thinking_type: Option<String>,

    /// Token budget for the thinking trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ThinkingConfig {
    /// Create an enabled thinking config with the given budget.
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            thinking_type: Some("enabled".to_string()),
            budget_tokens: Some(budget_tokens),
        }
    }
}
