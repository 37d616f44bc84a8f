//! SSE collection: Google event stream to a single Messages response.
//!
//! Thinking-capable models only answer on the SSE path, so the unary
//! dispatcher drives this collector over the byte stream and hands the
//! caller one ordinary response. The block state machine is
//! `idle -> thinking -> text | tool_use`: consecutive thinking parts
//! accumulate into one thinking block (last-seen signature wins), text
//! parts accumulate into one text block, and each function call closes
//! the open block and emits a tool_use block.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::constants::{get_model_family, ModelFamily, MIN_SIGNATURE_LENGTH};
use crate::convert::response::{
    generate_message_id, generate_tool_use_id, map_stop_reason,
};
use crate::models::content::ContentBlock;
use crate::models::google::{GoogleResponse, Part};
use crate::models::response::{MessagesResponse, Usage};
use crate::signature::GLOBAL_SIGNATURE_CACHE;

/// Accumulates SSE chunks into a single Messages response.
pub struct SseCollector {
    model: String,
    family: ModelFamily,
    buffer: String,
    blocks: Vec<ContentBlock>,
    current: CurrentBlock,
    finish_reason: Option<String>,
    saw_tool_use: bool,
    usage: Usage,
}

enum CurrentBlock {
    Idle,
    Thinking { text: String, signature: String },
    Text { text: String },
}

impl SseCollector {
    /// Create a collector for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let family = get_model_family(&model);
        Self {
            model,
            family,
            buffer: String::new(),
            blocks: Vec::new(),
            current: CurrentBlock::Idle,
            finish_reason: None,
            saw_tool_use: false,
            usage: Usage::default(),
        }
    }

    /// Feed one chunk of the byte stream.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].to_string();
            self.buffer = self.buffer[newline + 1..].to_string();
            self.process_line(&line);
        }
    }

    /// Consume any trailing line and build the response.
    pub fn finish(mut self) -> MessagesResponse {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line);
        }
        self.close_current();

        if self.blocks.is_empty() {
            self.blocks.push(ContentBlock::text(""));
        }

        let stop_reason = map_stop_reason(self.finish_reason.as_deref(), self.saw_tool_use);
        MessagesResponse::new(
            generate_message_id(),
            self.model.clone(),
            self.blocks,
            Some(stop_reason),
            self.usage,
        )
    }

    fn process_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') || !line.starts_with("data:") {
            return;
        }
        let payload = line[5..].trim();
        if payload.is_empty() || payload == "[DONE]" {
            return;
        }

        let data: GoogleResponse = match serde_json::from_str(payload) {
            Ok(data) => data,
            Err(e) => {
                debug!(
                    error = %e,
                    data = %payload.chars().take(120).collect::<String>(),
                    "Skipping malformed SSE line"
                );
                return;
            }
        };

        let inner = data.inner();
        if let Some(usage) = &inner.usage_metadata {
            let cached = usage.cached_content_token_count.unwrap_or(0);
            self.usage = Usage {
                input_tokens: usage.prompt_token_count.saturating_sub(cached),
                output_tokens: usage.candidates_token_count,
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: cached,
            };
        }
        if let Some(reason) = data.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }

        let parts: Vec<Part> = data.first_candidate_parts().to_vec();
        for part in &parts {
            self.process_part(part);
        }
    }

    fn process_part(&mut self, part: &Part) {
        if part.is_thought() {
            let text = part.text.as_deref().unwrap_or("");
            let part_signature = part.thought_signature.as_deref().unwrap_or("");

            if let CurrentBlock::Thinking { text: acc, signature } = &mut self.current {
                acc.push_str(text);
                if !part_signature.is_empty() {
                    *signature = part_signature.to_string();
                }
            } else {
                self.close_current();
                self.current = CurrentBlock::Thinking {
                    text: text.to_string(),
                    signature: part_signature.to_string(),
                };
            }

            if part_signature.len() >= MIN_SIGNATURE_LENGTH {
                GLOBAL_SIGNATURE_CACHE.store_thinking_signature(part_signature, self.family);
            }
        } else if let Some(call) = &part.function_call {
            self.close_current();
            self.saw_tool_use = true;

            let id = call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_tool_use_id);

            if let Some(sig) = part.thought_signature.as_deref() {
                if sig.len() >= MIN_SIGNATURE_LENGTH {
                    GLOBAL_SIGNATURE_CACHE.store_tool_signature(&id, sig);
                }
            }

            let input = if call.args.is_null() {
                serde_json::json!({})
            } else {
                call.args.clone()
            };

            self.blocks.push(ContentBlock::ToolUse {
                id,
                name: call.name.clone(),
                input,
                thought_signature: part.thought_signature.clone(),
                cache_control: None,
            });
        } else if let Some(text) = &part.text {
            if text.is_empty() {
                return;
            }
            if let CurrentBlock::Text { text: acc } = &mut self.current {
                acc.push_str(text);
            } else {
                self.close_current();
                self.current = CurrentBlock::Text {
                    text: text.to_string(),
                };
            }
        }
    }

    /// Flush the open accumulation block into the output list.
    fn close_current(&mut self) {
        match std::mem::replace(&mut self.current, CurrentBlock::Idle) {
            CurrentBlock::Idle => {}
            CurrentBlock::Thinking { text, signature } => {
                self.blocks.push(ContentBlock::Thinking {
                    thinking: text,
                    signature: Some(signature),
                    cache_control: None,
                });
            }
            CurrentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    self.blocks.push(ContentBlock::text(text));
                }
            }
        }
    }
}

/// Drive a byte stream through a collector.
pub async fn collect_sse_response<S, E>(mut stream: S, model: &str) -> MessagesResponse
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut collector = SseCollector::new(model);
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => collector.push_chunk(&bytes),
            Err(e) => {
                debug!(error = %e, "Upstream stream failed during collection");
                break;
            }
        }
    }
    collector.finish()
}
