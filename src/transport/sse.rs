//! SSE pass-through: Google event stream to Anthropic event stream.
//!
//! [`SseEventStream`] adapts an upstream byte stream into the Anthropic
//! event grammar:
//!
//! ```text
//! message_start
//! (content_block_start, content_block_delta+, content_block_stop)*
//! message_delta
//! message_stop
//! ```
//!
//! Lines are buffered across chunk boundaries and parsed on `\n`.
//! Malformed JSON data lines are logged and skipped. The stream always
//! terminates with `message_stop`, including on mid-stream transport
//! failure or an upstream that never produced a part.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use pin_project_lite::pin_project;
use tracing::{debug, warn};

use crate::constants::{get_model_family, ModelFamily, MIN_SIGNATURE_LENGTH};
use crate::convert::response::{generate_message_id, generate_tool_use_id, map_stop_reason};
use crate::models::content::ContentBlock;
use crate::models::google::{GoogleResponse, Part};
use crate::models::response::Usage;
use crate::models::stream::{ContentDelta, MessageDelta, PartialMessage, StreamEvent};
use crate::signature::GLOBAL_SIGNATURE_CACHE;

pin_project! {
    /// Lazy Anthropic event stream over an upstream SSE byte stream.
    pub struct SseEventStream<S> {
        #[pin]
        byte_stream: S,
        state: StreamState,
        buffer: String,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }
}

impl<S, E> SseEventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    /// Create a stream adapter for the given model.
    pub fn new(byte_stream: S, model: impl Into<String>) -> Self {
        Self {
            byte_stream,
            state: StreamState::new(model.into()),
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseEventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match this.byte_stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(newline) = this.buffer.find('\n') {
                        let line = this.buffer[..newline].to_string();
                        *this.buffer = this.buffer[newline + 1..].to_string();
                        this.pending.extend(process_sse_line(&line, this.state));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    // Transport failure mid-stream: close out gracefully so
                    // the client still sees message_stop.
                    warn!(error = %e, "Upstream stream failed mid-flight");
                    this.pending.extend(finalize(this.state));
                    *this.done = true;
                }
                Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(this.buffer);
                        this.pending.extend(process_sse_line(&line, this.state));
                    }
                    this.pending.extend(finalize(this.state));
                    *this.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Parser state shared by all chunks of one stream.
struct StreamState {
    message_id: String,
    model: String,
    family: ModelFamily,
    started: bool,
    block_index: usize,
    current_block: Option<BlockKind>,
    current_signature: String,
    finish_reason: Option<String>,
    saw_tool_use: bool,
    input_tokens: u32,
    output_tokens: u32,
    cache_read_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

impl StreamState {
    fn new(model: String) -> Self {
        let family = get_model_family(&model);
        Self {
            message_id: generate_message_id(),
            model,
            family,
            started: false,
            block_index: 0,
            current_block: None,
            current_signature: String::new(),
            finish_reason: None,
            saw_tool_use: false,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    fn usage(&self, output_tokens: u32) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_sub(self.cache_read_tokens),
            output_tokens,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: self.cache_read_tokens,
        }
    }
}

/// Process one SSE line into zero or more events.
fn process_sse_line(line: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') || !line.starts_with("data:") {
        return Vec::new();
    }

    let payload = line[5..].trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Vec::new();
    }

    let data: GoogleResponse = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(e) => {
            debug!(
                error = %e,
                data = %payload.chars().take(120).collect::<String>(),
                "Skipping malformed SSE line"
            );
            return Vec::new();
        }
    };

    let inner = data.inner();
    if let Some(usage) = &inner.usage_metadata {
        state.input_tokens = usage.prompt_token_count;
        state.output_tokens = usage.candidates_token_count;
        state.cache_read_tokens = usage.cached_content_token_count.unwrap_or(0);
    }
    if let Some(reason) = data.finish_reason() {
        state.finish_reason = Some(reason.to_string());
    }

    let parts = data.first_candidate_parts();
    let mut events = Vec::new();

    if !state.started && !parts.is_empty() {
        state.started = true;
        events.push(StreamEvent::message_start(PartialMessage::new(
            &state.message_id,
            &state.model,
            state.usage(0),
        )));
    }

    for part in parts {
        events.extend(process_part(part, state));
    }

    events
}

/// Process one Google part, switching blocks as needed.
fn process_part(part: &Part, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if part.is_thought() {
        let text = part.text.as_deref().unwrap_or("");
        let signature = part.thought_signature.as_deref().unwrap_or("");

        if state.current_block != Some(BlockKind::Thinking) {
            events.extend(close_current_block(state));
            state.current_block = Some(BlockKind::Thinking);
            events.push(StreamEvent::content_block_start(
                state.block_index,
                ContentBlock::thinking("", None),
            ));
        }

        if signature.len() >= MIN_SIGNATURE_LENGTH {
            state.current_signature = signature.to_string();
            GLOBAL_SIGNATURE_CACHE.store_thinking_signature(signature, state.family);
        }

        if !text.is_empty() {
            events.push(StreamEvent::content_block_delta(
                state.block_index,
                ContentDelta::thinking(text),
            ));
        }
    } else if let Some(call) = &part.function_call {
        events.extend(close_current_block(state));
        state.current_block = Some(BlockKind::ToolUse);
        state.saw_tool_use = true;

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

        events.push(StreamEvent::content_block_start(
            state.block_index,
            ContentBlock::ToolUse {
                id,
                name: call.name.clone(),
                input: serde_json::json!({}),
                thought_signature: part.thought_signature.clone(),
                cache_control: None,
            },
        ));

        let args_json = if call.args.is_null() {
            "{}".to_string()
        } else {
            serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string())
        };
        events.push(StreamEvent::content_block_delta(
            state.block_index,
            ContentDelta::input_json(args_json),
        ));
    } else if let Some(text) = &part.text {
        if text.trim().is_empty() {
            return events;
        }

        if state.current_block != Some(BlockKind::Text) {
            events.extend(close_current_block(state));
            state.current_block = Some(BlockKind::Text);
            events.push(StreamEvent::content_block_start(
                state.block_index,
                ContentBlock::text(""),
            ));
        }

        events.push(StreamEvent::content_block_delta(
            state.block_index,
            ContentDelta::text(text),
        ));
    }

    events
}

/// Close the open block, emitting the pending thinking signature first.
fn close_current_block(state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let Some(kind) = state.current_block.take() else {
        return events;
    };

    if kind == BlockKind::Thinking && !state.current_signature.is_empty() {
        events.push(StreamEvent::content_block_delta(
            state.block_index,
            ContentDelta::signature(std::mem::take(&mut state.current_signature)),
        ));
    }
    state.current_signature.clear();

    events.push(StreamEvent::content_block_stop(state.block_index));
    state.block_index += 1;
    events
}

/// Terminal events: close the open block and emit the message trailer.
///
/// A stream that never produced a part still yields the full grammar with
/// a fallback empty text block.
fn finalize(state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = close_current_block(state);

    if !state.started {
        state.started = true;
        events.push(StreamEvent::message_start(PartialMessage::new(
            &state.message_id,
            &state.model,
            state.usage(0),
        )));
        events.push(StreamEvent::content_block_start(
            state.block_index,
            ContentBlock::text(""),
        ));
        events.push(StreamEvent::content_block_stop(state.block_index));
        state.block_index += 1;
    }

    let stop_reason = map_stop_reason(state.finish_reason.as_deref(), state.saw_tool_use);
    events.push(StreamEvent::message_delta(
        MessageDelta::new(Some(stop_reason)),
        Some(state.usage(state.output_tokens)),
    ));
    events.push(StreamEvent::message_stop());
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::StopReason;
    use futures::StreamExt;

    /// Run chunks through the adapter and collect all events.
    async fn run(chunks: Vec<&str>, model: &str) -> Vec<StreamEvent> {
        let byte_stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::convert::Infallible>(Bytes::from(c.to_string())))
                .collect::<Vec<_>>(),
        );
        SseEventStream::new(byte_stream, model).collect().await
    }

    fn event_names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    /// Assert the event sequence obeys the grammar
    /// `message_start (start delta+ stop)* message_delta message_stop`.
    fn assert_grammar(events: &[StreamEvent]) {
        #[derive(PartialEq)]
        enum S {
            Start,
            Between,
            InBlock,
            AfterDelta,
            Done,
        }
        let mut s = S::Start;
        for event in events {
            s = match (s, event) {
                (S::Start, StreamEvent::MessageStart { .. }) => S::Between,
                (S::Between, StreamEvent::ContentBlockStart { .. }) => S::InBlock,
                (S::InBlock, StreamEvent::ContentBlockDelta { .. }) => S::InBlock,
                (S::InBlock, StreamEvent::ContentBlockStop { .. }) => S::Between,
                (S::Between, StreamEvent::MessageDelta { .. }) => S::AfterDelta,
                (S::AfterDelta, StreamEvent::MessageStop) => S::Done,
                (_, other) => panic!("grammar violation at {other:?}"),
            };
        }
        assert!(matches!(s, S::Done), "stream did not terminate properly");
    }

    #[tokio::test]
    async fn test_simple_text_stream() {
        let events = run(
            vec![
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":10,\"candidatesTokenCount\":5}}\n",
            ],
            "claude-sonnet-4-5",
        )
        .await;

        assert_grammar(&events);
        assert_eq!(
            event_names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        match &events[5] {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
                assert_eq!(usage.unwrap().output_tokens, 5);
                assert_eq!(usage.unwrap().input_tokens, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let events = run(
            vec![
                "data: {\"candidates\":[{\"content\":{\"par",
                "ts\":[{\"text\":\"joined\"}]}}]}\n",
            ],
            "claude-sonnet-4-5",
        )
        .await;

        assert_grammar(&events);
        let delta = events
            .iter()
            .find(|e| e.is_content_block_delta())
            .unwrap();
        match delta {
            StreamEvent::ContentBlockDelta { delta, .. } => {
                assert_eq!(delta, &ContentDelta::text("joined"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_thinking_then_tool_use() {
        GLOBAL_SIGNATURE_CACHE.clear_all();
        let sig = "g".repeat(MIN_SIGNATURE_LENGTH);
        let chunk1 =
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"thinking 1\",\"thought\":true}]}}]}\n"
                .to_string();
        let chunk2 = format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"thinking 2\",\"thought\":true,\"thoughtSignature\":\"{sig}\"}}]}}}}]}}\n"
        );
        let chunk3 = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"read_file\",\"args\":{\"path\":\"/tmp/x\"}}}]},\"finishReason\":\"TOOL_USE\"}]}\n".to_string();

        let events = run(
            vec![chunk1.as_str(), chunk2.as_str(), chunk3.as_str()],
            "gemini-3-flash",
        )
        .await;

        assert_grammar(&events);
        assert_eq!(
            event_names(&events),
            vec![
                "message_start",
                "content_block_start",   // thinking, index 0
                "content_block_delta",   // thinking_delta 1
                "content_block_delta",   // thinking_delta 2
                "content_block_delta",   // signature_delta
                "content_block_stop",    // index 0
                "content_block_start",   // tool_use, index 1
                "content_block_delta",   // input_json_delta
                "content_block_stop",    // index 1
                "message_delta",
                "message_stop",
            ]
        );

        // Signature delta fires at the transition out of thinking.
        match &events[4] {
            StreamEvent::ContentBlockDelta { delta, index } => {
                assert_eq!(*index, 0);
                assert!(delta.is_signature());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Tool block opens at index 1 with empty input.
        match &events[6] {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                assert_eq!(*index, 1);
                let (id, name, input) = content_block.as_tool_use().unwrap();
                assert!(id.starts_with("toolu_"));
                assert_eq!(name, "read_file");
                assert_eq!(input, &serde_json::json!({}));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Whole args JSON arrives as one input_json_delta.
        match &events[7] {
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentDelta::InputJsonDelta { partial_json } => {
                    assert_eq!(
                        serde_json::from_str::<serde_json::Value>(partial_json).unwrap(),
                        serde_json::json!({"path": "/tmp/x"})
                    );
                }
                other => panic!("unexpected delta: {other:?}"),
            },
            other => panic!("unexpected event: {other:?}"),
        }

        match events.last().unwrap() {
            StreamEvent::MessageStop => {}
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[9] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The thinking signature was cached with the Gemini family.
        assert_eq!(
            GLOBAL_SIGNATURE_CACHE.lookup_family(&sig),
            Some(ModelFamily::Gemini)
        );
    }

    #[tokio::test]
    async fn test_stop_overrides_tool_use() {
        let events = run(
            vec![
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"f\",\"args\":{}}}]},\"finishReason\":\"STOP\"}]}\n",
            ],
            "claude-sonnet-4-5",
        )
        .await;
        let delta = events.iter().find(|e| e.is_message_delta()).unwrap();
        match delta {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_fallback() {
        let events = run(vec![], "claude-sonnet-4-5").await;
        assert_grammar(&events);
        assert_eq!(
            event_names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        match &events[1] {
            StreamEvent::ContentBlockStart { content_block, .. } => {
                assert_eq!(content_block.as_text(), Some(""));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let events = run(
            vec![
                "data: {not json}\n",
                ": comment line\n",
                "event: something\n",
                "data: [DONE]\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]},\"finishReason\":\"STOP\"}]}\n",
            ],
            "claude-sonnet-4-5",
        )
        .await;
        assert_grammar(&events);
        assert!(events.iter().any(|e| e.is_content_block_delta()));
    }

    #[tokio::test]
    async fn test_whitespace_text_parts_dropped() {
        let events = run(
            vec![
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"   \"}]}}]}\n",
            ],
            "claude-sonnet-4-5",
        )
        .await;
        // Only the fallback block appears; the whitespace part opened nothing.
        assert_eq!(
            event_names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_error_still_terminates() {
        let byte_stream = futures::stream::iter(vec![
            Ok(Bytes::from(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n",
            )),
            Err(std::io::Error::other("connection reset")),
        ]);
        let events: Vec<StreamEvent> = SseEventStream::new(byte_stream, "claude-sonnet-4-5")
            .collect()
            .await;
        assert_grammar(&events);
        assert!(events.last().unwrap().is_message_stop());
    }

    #[tokio::test]
    async fn test_wrapped_sse_payload() {
        let events = run(
            vec![
                "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"nested\"}]},\"finishReason\":\"STOP\"}]}}\n",
            ],
            "gemini-3-flash",
        )
        .await;
        assert_grammar(&events);
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } if text == "nested"
        )));
    }
}
