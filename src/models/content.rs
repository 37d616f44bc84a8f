//! Anthropic content block types.
//!
//! A message's content is either a bare string or an ordered array of
//! tagged blocks. The block cases accepted on the wire:
//!
//! | type | purpose |
//! |------|---------|
//! | `text` | plain text |
//! | `image` | base64 or url-sourced image |
//! | `document` | base64 or url-sourced document (PDF etc.) |
//! | `tool_use` | a model-issued tool call |
//! | `tool_result` | the caller's answer to a tool call |
//! | `thinking` | a signed reasoning trace |
//! | `redacted_thinking` | an opaque reasoning trace; never forwarded |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
        /// Prompt-caching marker, passed through untouched.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },

    /// An image, base64-embedded or referenced by URL.
    Image {
        /// Where the image bytes come from.
        source: MediaSource,
    },

    /// A document (PDF and friends), base64-embedded or referenced by URL.
    Document {
        /// Where the document bytes come from.
        source: MediaSource,
    },

    /// A tool call issued by the model.
    ToolUse {
        /// Tool-use id (`toolu_…`).
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        #[serde(default)]
        input: Value,
        /// Gemini thought signature riding on the call, when the history
        /// originated from a Gemini producer.
        #[serde(
            rename = "thoughtSignature",
            alias = "thought_signature",
            skip_serializing_if = "Option::is_none"
        )]
        thought_signature: Option<String>,
        /// Prompt-caching marker.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },

    /// The caller's answer to a tool call.
    ToolResult {
        /// Id of the tool call being answered.
        tool_use_id: String,
        /// Result payload: a string or nested blocks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        /// Whether the tool execution failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        /// Prompt-caching marker.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },

    /// A signed reasoning trace.
    Thinking {
        /// The reasoning text.
        thinking: String,
        /// Integrity token produced by the upstream model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        /// Prompt-caching marker.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },

    /// An opaque, encrypted reasoning trace. Never forwarded upstream.
    RedactedThinking {
        /// Opaque payload.
        data: String,
    },

    /// Unrecognized block type; skipped during conversion.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Create a tool_use block.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            thought_signature: None,
            cache_control: None,
        }
    }

    /// Create a tool_use block carrying a Gemini thought signature.
    pub fn tool_use_signed(
        id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
        signature: impl Into<String>,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            thought_signature: Some(signature.into()),
            cache_control: None,
        }
    }

    /// Create a tool_result block with text content.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(ToolResultContent::Text(content.into())),
            is_error: None,
            cache_control: None,
        }
    }

    /// Create a thinking block.
    pub fn thinking(thinking: impl Into<String>, signature: Option<String>) -> Self {
        ContentBlock::Thinking {
            thinking: thinking.into(),
            signature,
            cache_control: None,
        }
    }

    /// Create a base64 image block.
    pub fn image_base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: MediaSource::Base64 {
                media_type: Some(media_type.into()),
                data: data.into(),
            },
        }
    }

    /// Create a url-sourced image block.
    pub fn image_url(url: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: MediaSource::Url {
                url: url.into(),
                media_type: None,
            },
        }
    }

    /// Create a base64 document block.
    pub fn document_base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Document {
            source: MediaSource::Base64 {
                media_type: Some(media_type.into()),
                data: data.into(),
            },
        }
    }

    /// Check if this is a text block.
    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text { .. })
    }

    /// Check if this is a tool_use block.
    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentBlock::ToolUse { .. })
    }

    /// Check if this is a tool_result block.
    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }

    /// Check if this is a thinking block.
    pub fn is_thinking(&self) -> bool {
        matches!(self, ContentBlock::Thinking { .. })
    }

    /// Get the text if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Get the thinking text if this is a thinking block.
    pub fn as_thinking(&self) -> Option<&str> {
        match self {
            ContentBlock::Thinking { thinking, .. } => Some(thinking),
            _ => None,
        }
    }

    /// Get `(id, name, input)` if this is a tool_use block.
    pub fn as_tool_use(&self) -> Option<(&str, &str, &Value)> {
        match self {
            ContentBlock::ToolUse {
                id, name, input, ..
            } => Some((id, name, input)),
            _ => None,
        }
    }

    /// Get the signature if this is a thinking block with one.
    pub fn thinking_signature(&self) -> Option<&str> {
        match self {
            ContentBlock::Thinking { signature, .. } => signature.as_deref(),
            _ => None,
        }
    }
}

/// Source of image/document bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// Base64-embedded bytes.
    Base64 {
        /// MIME type, when the caller supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
        /// Base64-encoded payload.
        data: String,
    },

    /// Remote bytes referenced by URL.
    Url {
        /// The URL.
        url: String,
        /// MIME type, when the caller supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

/// Content of a tool_result block: a string or nested blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain text result.
    Text(String),
    /// Structured result with text and image blocks.
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Create a text result.
    pub fn text(text: impl Into<String>) -> Self {
        ToolResultContent::Text(text.into())
    }
}
