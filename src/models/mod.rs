//! Wire models for both sides of the proxy.
//!
//! The `content`, `request`, `response`, `stream`, and `tools` modules hold
//! the Anthropic Messages API shapes accepted and produced by the proxy.
//! The `google` module holds the Cloud Code / Generative AI shapes sent
//! upstream. Conversion between the two lives in [`crate::convert`].

pub mod content;
pub mod google;
pub mod request;
pub mod response;
pub mod stream;
pub mod tools;

pub use content::{ContentBlock, MediaSource, ToolResultContent};
pub use request::{Message, MessageContent, MessagesRequest, Role, SystemBlock, SystemPrompt, ThinkingConfig};
pub use response::{MessagesResponse, StopReason, Usage};
pub use stream::{ContentDelta, MessageDelta, PartialMessage, StreamEvent};
pub use tools::{Tool, ToolChoice};
