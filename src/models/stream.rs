//! Streaming event types for the Messages API.
//!
//! Events are emitted over SSE in a fixed grammar:
//!
//! ```text
//! message_start
//! (content_block_start, content_block_delta+, content_block_stop)*
//! message_delta
//! message_stop
//! ```

use serde::{Deserialize, Serialize};

use super::content::ContentBlock;
use super::request::Role;
use super::response::{StopReason, Usage};

/// A streaming event from the Messages API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Beginning of the response.
    MessageStart {
        /// The partial message being started.
        message: PartialMessage,
    },

    /// Start of a content block.
    ContentBlockStart {
        /// Index of this block (0-based, monotonic).
        index: usize,
        /// The initial (possibly empty) block.
        content_block: ContentBlock,
    },

    /// Incremental update to a content block.
    ContentBlockDelta {
        /// Index of the block being updated.
        index: usize,
        /// The delta to apply.
        delta: ContentDelta,
    },

    /// End of a content block.
    ContentBlockStop {
        /// Index of the block that finished.
        index: usize,
    },

    /// Final message metadata.
    MessageDelta {
        /// Stop reason and sequence.
        delta: MessageDelta,
        /// Final usage.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// End of the response.
    MessageStop,

    /// Keep-alive.
    Ping,
}

impl StreamEvent {
    /// Create a message_start event.
    pub fn message_start(message: PartialMessage) -> Self {
        StreamEvent::MessageStart { message }
    }

    /// Create a content_block_start event.
    pub fn content_block_start(index: usize, content_block: ContentBlock) -> Self {
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        }
    }

    /// Create a content_block_delta event.
    pub fn content_block_delta(index: usize, delta: ContentDelta) -> Self {
        StreamEvent::ContentBlockDelta { index, delta }
    }

    /// Create a content_block_stop event.
    pub fn content_block_stop(index: usize) -> Self {
        StreamEvent::ContentBlockStop { index }
    }

    /// Create a message_delta event.
    pub fn message_delta(delta: MessageDelta, usage: Option<Usage>) -> Self {
        StreamEvent::MessageDelta { delta, usage }
    }

    /// Create a message_stop event.
    pub fn message_stop() -> Self {
        StreamEvent::MessageStop
    }

    /// The SSE event name for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
        }
    }

    /// Check if this is a message_start event.
    pub fn is_message_start(&self) -> bool {
        matches!(self, StreamEvent::MessageStart { .. })
    }

    /// Check if this is a content_block_start event.
    pub fn is_content_block_start(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockStart { .. })
    }

    /// Check if this is a content_block_delta event.
    pub fn is_content_block_delta(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockDelta { .. })
    }

    /// Check if this is a content_block_stop event.
    pub fn is_content_block_stop(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockStop { .. })
    }

    /// Check if this is a message_delta event.
    pub fn is_message_delta(&self) -> bool {
        matches!(self, StreamEvent::MessageDelta { .. })
    }

    /// Check if this is a message_stop event.
    pub fn is_message_stop(&self) -> bool {
        matches!(self, StreamEvent::MessageStop)
    }
}

/// Delta types for incremental content updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Incremental text.
    TextDelta {
        /// The text to append.
        text: String,
    },

    /// Tool-call arguments; this proxy emits the whole JSON once.
    InputJsonDelta {
        /// The partial JSON to append.
        partial_json: String,
    },

    /// Incremental thinking text.
    ThinkingDelta {
        /// The thinking text to append.
        thinking: String,
    },

    /// Signature of the finished thinking block.
    SignatureDelta {
        /// The signature value.
        signature: String,
    },
}

impl ContentDelta {
    /// Create a text delta.
    pub fn text(text: impl Into<String>) -> Self {
        ContentDelta::TextDelta { text: text.into() }
    }

    /// Create an input_json delta.
    pub fn input_json(partial_json: impl Into<String>) -> Self {
        ContentDelta::InputJsonDelta {
            partial_json: partial_json.into(),
        }
    }

    /// Create a thinking delta.
    pub fn thinking(thinking: impl Into<String>) -> Self {
        ContentDelta::ThinkingDelta {
            thinking: thinking.into(),
        }
    }

    /// Create a signature delta.
    pub fn signature(signature: impl Into<String>) -> Self {
        ContentDelta::SignatureDelta {
            signature: signature.into(),
        }
    }

    /// Check if this is a signature delta.
    pub fn is_signature(&self) -> bool {
        matches!(self, ContentDelta::SignatureDelta { .. })
    }

    /// Check if this is a thinking delta.
    pub fn is_thinking(&self) -> bool {
        matches!(self, ContentDelta::ThinkingDelta { .. })
    }
}

/// Final message metadata carried by `message_delta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDelta {
    /// The reason generation stopped.
    pub stop_reason: Option<StopReason>,

    /// Stop sequence that fired, if any.
    pub stop_sequence: Option<String>,
}

impl MessageDelta {
    /// Create a message delta with the given stop reason.
    pub fn new(stop_reason: Option<StopReason>) -> Self {
        Self {
            stop_reason,
            stop_sequence: None,
        }
    }
}

/// Partial message carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialMessage {
    /// Unique identifier (`msg_…`).
    pub id: String,

    /// Always `"message"`.
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,

    /// Always `assistant`.
    pub role: Role,

    /// Content array; starts empty.
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// The requested model.
    pub model: String,

    /// Not yet known; serialized as null.
    pub stop_reason: Option<StopReason>,

    /// Not yet known; serialized as null.
    pub stop_sequence: Option<String>,

    /// Initial usage; `output_tokens` is zero at start.
    pub usage: Usage,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl PartialMessage {
    /// Create a partial message for the start of a stream.
    pub fn new(id: impl Into<String>, model: impl Into<String>, usage: Usage) -> Self {
        Self {
            id: id.into(),
            message_type: "message".to_string(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let start = StreamEvent::message_start(PartialMessage::new("msg_1", "m", Usage::default()));
        assert_eq!(start.event_type(), "message_start");
        assert_eq!(StreamEvent::message_stop().event_type(), "message_stop");
        assert_eq!(
            StreamEvent::content_block_stop(0).event_type(),
            "content_block_stop"
        );
    }

    #[test]
    fn test_message_start_serialization() {
        let event = StreamEvent::message_start(PartialMessage::new(
            "msg_1",
            "gemini-3-flash",
            Usage::new(12, 0),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_start");
        assert_eq!(json["message"]["id"], "msg_1");
        assert_eq!(json["message"]["role"], "assistant");
        assert!(json["message"]["content"].as_array().unwrap().is_empty());
        assert!(json["message"]["stop_reason"].is_null());
        assert!(json["message"]["stop_sequence"].is_null());
        assert_eq!(json["message"]["usage"]["output_tokens"], 0);
    }

    #[test]
    fn test_delta_serialization() {
        let delta = StreamEvent::content_block_delta(1, ContentDelta::text("chunk"));
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["index"], 1);
        assert_eq!(json["delta"]["type"], "text_delta");
        assert_eq!(json["delta"]["text"], "chunk");
    }

    #[test]
    fn test_thinking_and_signature_deltas() {
        let thinking = serde_json::to_value(ContentDelta::thinking("hmm")).unwrap();
        assert_eq!(thinking["type"], "thinking_delta");

        let signature = serde_json::to_value(ContentDelta::signature("sig")).unwrap();
        assert_eq!(signature["type"], "signature_delta");
    }

    #[test]
    fn test_input_json_delta() {
        let delta = serde_json::to_value(ContentDelta::input_json(r#"{"x":1}"#)).unwrap();
        assert_eq!(delta["type"], "input_json_delta");
        assert_eq!(delta["partial_json"], r#"{"x":1}"#);
    }

    #[test]
    fn test_message_delta_carries_stop_reason() {
        let event = StreamEvent::message_delta(
            MessageDelta::new(Some(StopReason::ToolUse)),
            Some(Usage::new(10, 20)),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["delta"]["stop_reason"], "tool_use");
        assert_eq!(json["usage"]["output_tokens"], 20);
    }
}
