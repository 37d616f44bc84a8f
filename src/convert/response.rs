//! Response conversion: Google response to Anthropic Messages response.
//!
//! Accepts both the wrapped (`{response: {...}}`) and flat Cloud Code
//! response shapes. Thinking signatures and tool-call signatures observed
//! here are recorded in the signature cache so later turns can replay
//! them.

use crate::constants::{get_model_family, MIN_SIGNATURE_LENGTH};
use crate::models::content::ContentBlock;
use crate::models::google::GoogleResponse;
use crate::models::response::{MessagesResponse, StopReason, Usage};
use crate::signature::GLOBAL_SIGNATURE_CACHE;

/// Convert a Google response into a Messages response.
///
/// `model` is echoed back verbatim as the response model.
pub fn convert_response(response: &GoogleResponse, model: &str) -> MessagesResponse {
    let family = get_model_family(model);
    let mut content: Vec<ContentBlock> = Vec::new();
    let mut saw_tool_use = false;

    for part in response.first_candidate_parts() {
        if part.is_thought() {
            let text = part.text.clone().unwrap_or_default();
            let signature = part.thought_signature.clone().unwrap_or_default();
            if signature.len() >= MIN_SIGNATURE_LENGTH {
                GLOBAL_SIGNATURE_CACHE.store_thinking_signature(&signature, family);
            }
            content.push(ContentBlock::Thinking {
                thinking: text,
                signature: Some(signature),
                cache_control: None,
            });
        } else if let Some(call) = &part.function_call {
            saw_tool_use = true;
            let id = call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_tool_use_id);

            let signature = part.thought_signature.clone();
            if let Some(sig) = signature.as_deref() {
                if sig.len() >= MIN_SIGNATURE_LENGTH {
                    GLOBAL_SIGNATURE_CACHE.store_tool_signature(&id, sig);
                }
            }

            let input = if call.args.is_null() {
                serde_json::json!({})
            } else {
                call.args.clone()
            };

            content.push(ContentBlock::ToolUse {
                id,
                name: call.name.clone(),
                input,
                thought_signature: signature,
                cache_control: None,
            });
        } else if let Some(text) = &part.text {
            if !text.is_empty() {
                content.push(ContentBlock::text(text));
            }
        }
        // Anything else (inlineData echoes etc.) is ignored.
    }

    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    let stop_reason = map_stop_reason(response.finish_reason(), saw_tool_use);
    let usage = map_usage(response);

    MessagesResponse::new(generate_message_id(), model, content, Some(stop_reason), usage)
}

/// Map a Google finish reason to the Anthropic stop reason.
///
/// `STOP` maps to `end_turn` even when tool_use blocks were emitted; the
/// two streaming paths apply the same precedence.
pub fn map_stop_reason(finish_reason: Option<&str>, saw_tool_use: bool) -> StopReason {
    match finish_reason {
        Some("STOP") => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("TOOL_USE") => StopReason::ToolUse,
        _ => {
            if saw_tool_use {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            }
        }
    }
}

/// Map Google usage metadata to Anthropic usage accounting.
pub fn map_usage(response: &GoogleResponse) -> Usage {
    let metadata = response.inner().usage_metadata.as_ref();
    let prompt = metadata.map(|m| m.prompt_token_count).unwrap_or(0);
    let cached = metadata
        .and_then(|m| m.cached_content_token_count)
        .unwrap_or(0);
    let output = metadata.map(|m| m.candidates_token_count).unwrap_or(0);

    Usage {
        input_tokens: prompt.saturating_sub(cached),
        output_tokens: output,
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: cached,
    }
}

/// Generate a fresh `msg_…` id.
pub fn generate_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a fresh `toolu_…` id.
pub fn generate_tool_use_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}
