//! Conversation analysis and thinking-block repair.
//!
//! Thinking models refuse histories that re-enter a tool loop without a
//! signed thinking block on the last assistant turn, and Gemini rejects
//! thinking signatures produced by the Claude family. The helpers here
//! analyze a conversation, decide whether it needs repair, and apply the
//! recovery transform: closing an open tool loop with synthetic turns and
//! stripping thinking blocks that the destination family would reject.

use crate::constants::{ModelFamily, MIN_SIGNATURE_LENGTH};
use crate::models::content::ContentBlock;
use crate::models::google::Content;
use crate::models::request::{Message, MessageContent};
use crate::signature::GLOBAL_SIGNATURE_CACHE;

/// Derived, per-request view of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationState {
    /// The most recent assistant turn issued tool_use and its results
    /// arrived in a later user message.
    pub in_tool_loop: bool,

    /// An assistant tool_use was answered with a plain user message
    /// instead of a tool_result (the user cancelled).
    pub interrupted_tool: bool,

    /// The last assistant turn carries a thinking block with a valid
    /// signature.
    pub turn_has_thinking: bool,

    /// Number of tool_result blocks after the last assistant turn.
    pub tool_result_count: usize,

    /// Index of the last assistant message, if any.
    pub last_assistant_idx: Option<usize>,
}

/// Walk a conversation and compute its [`ConversationState`].
pub fn analyze_conversation_state(messages: &[Message]) -> ConversationState {
    let mut state = ConversationState::default();

    for (idx, message) in messages.iter().enumerate() {
        if message.is_assistant() {
            state.last_assistant_idx = Some(idx);
        }

        if !message.is_assistant() || !message.has_tool_use() {
            continue;
        }

        let tool_ids: Vec<&str> = message
            .as_blocks()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.as_tool_use().map(|(id, _, _)| id))
                    .collect()
            })
            .unwrap_or_default();

        // A matching tool_result in any later user message keeps the loop open.
        let answered = messages[idx + 1..].iter().any(|later| {
            later.is_user()
                && later.as_blocks().is_some_and(|blocks| {
                    blocks.iter().any(|b| match b {
                        ContentBlock::ToolResult { tool_use_id, .. } => {
                            tool_ids.iter().any(|id| id == tool_use_id)
                        }
                        _ => false,
                    })
                })
        });
        if answered {
            state.in_tool_loop = true;
        }

        // A plain user message directly after the tool_use means the user
        // skipped the tool result.
        if let Some(next) = messages.get(idx + 1) {
            if next.is_user() && !next.has_tool_result() {
                state.interrupted_tool = true;
            }
        }
    }

    if let Some(last_idx) = state.last_assistant_idx {
        state.turn_has_thinking = messages[last_idx].as_blocks().is_some_and(|blocks| {
            blocks.iter().any(|b| {
                b.thinking_signature()
                    .is_some_and(|sig| sig.len() >= MIN_SIGNATURE_LENGTH)
            })
        });

        state.tool_result_count = messages[last_idx + 1..]
            .iter()
            .filter_map(|m| m.as_blocks())
            .flatten()
            .filter(|b| b.is_tool_result())
            .count();
    }

    state
}

/// True when any assistant tool_use carries a thought signature,
/// indicating the history originated from a Gemini producer.
pub fn has_gemini_history(messages: &[Message]) -> bool {
    messages.iter().filter(|m| m.is_assistant()).any(|m| {
        m.as_blocks().is_some_and(|blocks| {
            blocks.iter().any(|b| {
                matches!(
                    b,
                    ContentBlock::ToolUse {
                        thought_signature: Some(sig),
                        ..
                    } if !sig.is_empty()
                )
            })
        })
    })
}

/// True when the conversation re-enters a tool loop without a signed
/// thinking block on the last assistant turn.
pub fn needs_thinking_recovery(messages: &[Message]) -> bool {
    let state = analyze_conversation_state(messages);
    (state.in_tool_loop || state.interrupted_tool) && !state.turn_has_thinking
}

/// Drop unsigned thinking blocks from the tail of a content array.
///
/// Stops at the first non-thinking or validly-signed thinking block.
pub fn remove_trailing_thinking_blocks(blocks: &[ContentBlock]) -> Vec<ContentBlock> {
    let mut result = blocks.to_vec();
    while let Some(last) = result.last() {
        let unsigned_thinking = matches!(
            last,
            ContentBlock::Thinking { signature, .. }
                if signature.as_deref().map(str::len).unwrap_or(0) < MIN_SIGNATURE_LENGTH
        );
        if unsigned_thinking {
            result.pop();
        } else {
            break;
        }
    }
    result
}

/// Drop thinking blocks with invalid signatures and strip `cache_control`
/// from the ones that survive.
pub fn restore_thinking_signatures(blocks: &[ContentBlock]) -> Vec<ContentBlock> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Thinking {
                thinking,
                signature,
                ..
            } => {
                let sig = signature.as_deref()?;
                if sig.len() < MIN_SIGNATURE_LENGTH {
                    return None;
                }
                Some(ContentBlock::Thinking {
                    thinking: thinking.clone(),
                    signature: Some(sig.to_string()),
                    cache_control: None,
                })
            }
            other => Some(other.clone()),
        })
        .collect()
}

/// Reorder assistant content to `[thinking…, text-and-other…, tool_use…]`.
///
/// Empty text blocks are dropped; unrecognized blocks are skipped.
pub fn reorder_assistant_content(blocks: &[ContentBlock]) -> Vec<ContentBlock> {
    let mut thinking = Vec::new();
    let mut middle = Vec::new();
    let mut tool_uses = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Unknown => {}
            ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. } => {
                thinking.push(block.clone());
            }
            ContentBlock::ToolUse { .. } => tool_uses.push(block.clone()),
            ContentBlock::Text { text, .. } => {
                if !text.trim().is_empty() {
                    middle.push(block.clone());
                }
            }
            _ => middle.push(block.clone()),
        }
    }

    thinking.extend(middle);
    thinking.extend(tool_uses);
    thinking
}

/// The recovery transform.
///
/// Closes an open tool loop with synthetic turns so the model starts a
/// fresh thinking block, and (for a Gemini destination) strips thinking
/// blocks whose signature is not known to be Gemini-produced. Claude
/// destinations keep all signed thinking; the model re-validates
/// signatures itself.
pub fn close_tool_loop_for_thinking(
    messages: &[Message],
    family: Option<ModelFamily>,
) -> Vec<Message> {
    let state = analyze_conversation_state(messages);
    let mut result: Vec<Message> = Vec::with_capacity(messages.len() + 2);

    for (idx, message) in messages.iter().enumerate() {
        // An interrupting plain user message gets a synthetic assistant
        // turn inserted ahead of it to close the dangling tool call.
        if state.interrupted_tool
            && idx > 0
            && message.is_user()
            && !message.has_tool_result()
            && messages[idx - 1].is_assistant()
            && messages[idx - 1].has_tool_use()
        {
            result.push(Message::assistant("Tool use was interrupted."));
        }
        result.push(message.clone());
    }

    if state.in_tool_loop {
        let summary = if state.tool_result_count > 1 {
            format!("{} tool executions completed", state.tool_result_count)
        } else {
            "Tool execution completed".to_string()
        };
        result.push(Message::assistant(summary));
        result.push(Message::user("Continue."));
    }

    if family == Some(ModelFamily::Gemini) {
        for message in &mut result {
            strip_foreign_thinking(message);
        }
    }

    result
}

/// Remove thinking blocks whose cached family is not Gemini.
///
/// Inserts a placeholder text block when a message would end up empty.
fn strip_foreign_thinking(message: &mut Message) {
    let MessageContent::Blocks(blocks) = &message.content else {
        return;
    };

    let kept: Vec<ContentBlock> = blocks
        .iter()
        .filter(|block| match block {
            ContentBlock::Thinking { signature, .. } => signature
                .as_deref()
                .is_some_and(|sig| {
                    GLOBAL_SIGNATURE_CACHE.is_signature_compatible(sig, ModelFamily::Gemini)
                }),
            _ => true,
        })
        .cloned()
        .collect();

    message.content = if kept.is_empty() {
        MessageContent::Blocks(vec![ContentBlock::text(".")])
    } else {
        MessageContent::Blocks(kept)
    };
}

/// Drop Google parts marked `thought: true` that lack a valid signature.
pub fn filter_unsigned_thinking_blocks(contents: Vec<Content>) -> Vec<Content> {
    contents
        .into_iter()
        .map(|mut content| {
            content.parts.retain(|part| {
                !part.is_thought()
                    || part
                        .thought_signature
                        .as_deref()
                        .is_some_and(|sig| sig.len() >= MIN_SIGNATURE_LENGTH)
            });
            content
        })
        .collect()
}
