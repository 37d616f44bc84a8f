//! Request conversion: Anthropic Messages request to Google format.
//!
//! Assembly order:
//!
//! 1. Thinking recovery on the message history, when the destination
//!    family requires it.
//! 2. Per-message content conversion, with assistant-turn reordering and
//!    trailing unsigned-thinking removal on the last assistant turn.
//! 3. Generation knobs (`max_tokens` -> `maxOutputTokens`, etc.), with
//!    the Gemini output clamp and the Claude thinking-budget raise.
//! 4. System instruction, with the interleaved-thinking sentinel for
//!    Claude thinking models that carry tools.
//! 5. Tool declarations, schemas sanitized per destination family.
//! 6. Session-id attachment for upstream cache continuity.

use std::sync::LazyLock;

use crate::constants::{
    get_model_family, is_thinking_model, ModelFamily, CLAUDE_DEFAULT_THINKING_BUDGET,
    CLAUDE_THINKING_HEADROOM, GEMINI_DEFAULT_THINKING_BUDGET, GEMINI_MAX_OUTPUT_TOKENS,
    INTERLEAVED_THINKING_HINT,
};
use crate::models::google::{
    Content, FunctionDeclaration, GenerationConfig, GoogleRequest, GoogleThinkingConfig,
    GoogleTool, Part, ToolConfig,
};
use crate::models::request::{Message, MessageContent, MessagesRequest, SystemPrompt};
use crate::models::tools::{Tool, ToolChoice};
use crate::session::derive_session_id;

use super::content::{convert_content_to_parts, convert_role};
use super::schema::{clean_schema_for_gemini, sanitize_for_antigravity};
use super::thinking::{
    close_tool_loop_for_thinking, has_gemini_history, needs_thinking_recovery,
    remove_trailing_thinking_blocks, reorder_assistant_content, restore_thinking_signatures,
};

/// Output-token clamp for Gemini destinations, env-overridable.
static GEMINI_OUTPUT_CAP: LazyLock<u32> = LazyLock::new(|| {
    std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(GEMINI_MAX_OUTPUT_TOKENS)
});

/// Convert an Anthropic Messages request into a Google request.
pub fn convert_request(request: &MessagesRequest) -> GoogleRequest {
    let family = get_model_family(&request.model);
    let is_claude = family == ModelFamily::Claude;
    let is_gemini = family == ModelFamily::Gemini;
    let is_thinking = is_thinking_model(&request.model);

    let mut google_request = GoogleRequest::new();

    // Repair histories that would make the destination model reject the
    // request: Gemini when a tool loop is open without fresh thinking,
    // Claude when the history carries Gemini thought signatures.
    let messages: Vec<Message> = if is_gemini && needs_thinking_recovery(&request.messages) {
        close_tool_loop_for_thinking(&request.messages, Some(ModelFamily::Gemini))
    } else if is_claude && has_gemini_history(&request.messages) {
        close_tool_loop_for_thinking(&request.messages, Some(ModelFamily::Claude))
    } else {
        request.messages.clone()
    };

    google_request.contents = convert_messages(&messages, &request.model);

    // Generation knobs.
    let mut gen_config = GenerationConfig {
        max_output_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        stop_sequences: request
            .stop_sequences
            .clone()
            .filter(|seqs| !seqs.is_empty()),
    };

    // Thinking config.
    if is_thinking {
        if is_claude {
            let budget = request
                .thinking_budget()
                .unwrap_or(CLAUDE_DEFAULT_THINKING_BUDGET);
            if request.max_tokens <= budget {
                gen_config.max_output_tokens = Some(budget + CLAUDE_THINKING_HEADROOM);
            }
            google_request.thinking_config = Some(GoogleThinkingConfig::claude(budget));
        } else if is_gemini {
            let budget = request
                .thinking_budget()
                .unwrap_or(GEMINI_DEFAULT_THINKING_BUDGET);
            google_request.thinking_config = Some(GoogleThinkingConfig::gemini(budget));
        }
    }

    // Gemini rejects requests over its output cap.
    if is_gemini {
        if let Some(max) = gen_config.max_output_tokens {
            gen_config.max_output_tokens = Some(max.min(*GEMINI_OUTPUT_CAP));
        }
    }

    google_request.generation_config = Some(gen_config);

    // System instruction.
    let mut parts = request.system.as_ref().map(system_parts).unwrap_or_default();
    if is_claude && is_thinking && request.has_tools() {
        append_interleaved_hint(&mut parts);
    }
    if !parts.is_empty() {
        google_request.system_instruction = Some(Content::system(parts));
    }

    // Tools.
    if let Some(tools) = request.tools.as_deref().filter(|t| !t.is_empty()) {
        let declarations = convert_tools(tools, family);
        google_request.tools = Some(vec![GoogleTool::new(declarations)]);
    }
    if let Some(choice) = &request.tool_choice {
        google_request.tool_config = Some(convert_tool_choice(choice));
    }

    google_request.session_id = Some(derive_session_id(&request.messages));

    google_request
}

/// Convert messages to the Google contents array.
fn convert_messages(messages: &[Message], model: &str) -> Vec<Content> {
    let last_assistant_idx = messages.iter().rposition(|m| m.is_assistant());
    let mut contents = Vec::with_capacity(messages.len());

    for (idx, message) in messages.iter().enumerate() {
        let parts = match &message.content {
            MessageContent::Text(text) => {
                if text.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![Part::text(text)]
                }
            }
            MessageContent::Blocks(blocks) => {
                let blocks = if message.is_assistant() {
                    let mut prepared =
                        reorder_assistant_content(&restore_thinking_signatures(blocks));
                    if Some(idx) == last_assistant_idx {
                        prepared = remove_trailing_thinking_blocks(&prepared);
                    }
                    prepared
                } else {
                    blocks.clone()
                };
                convert_content_to_parts(&blocks, model)
            }
        };

        // The upstream rejects turns with no parts.
        let parts = if parts.is_empty() {
            vec![Part::text("")]
        } else {
            parts
        };

        contents.push(Content {
            role: Some(convert_role(message.role)),
            parts,
        });
    }

    contents
}

/// Convert a system prompt to parts, skipping empty text.
fn system_parts(system: &SystemPrompt) -> Vec<Part> {
    match system {
        SystemPrompt::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Part::text(text)]
            }
        }
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| {
                let crate::models::request::SystemBlock::Text { text, .. } = block;
                if text.is_empty() {
                    None
                } else {
                    Some(Part::text(text))
                }
            })
            .collect(),
    }
}

/// Append the interleaved-thinking sentinel to the system instruction.
fn append_interleaved_hint(parts: &mut Vec<Part>) {
    match parts.last_mut().and_then(|p| p.text.as_mut()) {
        Some(text) => {
            text.push_str("\n\n");
            text.push_str(INTERLEAVED_THINKING_HINT);
        }
        None => parts.push(Part::text(INTERLEAVED_THINKING_HINT)),
    }
}

/// Convert tools to function declarations with sanitized schemas.
fn convert_tools(tools: &[Tool], family: ModelFamily) -> Vec<FunctionDeclaration> {
    tools
        .iter()
        .enumerate()
        .map(|(idx, tool)| {
            let name = sanitize_tool_name(&tool.canonical_name(idx));
            let schema = tool.schema().cloned().unwrap_or(serde_json::Value::Null);
            let parameters = match family {
                ModelFamily::Gemini => clean_schema_for_gemini(&schema),
                _ => sanitize_for_antigravity(&schema),
            };
            FunctionDeclaration::new(name, tool.description.clone(), Some(parameters))
        })
        .collect()
}

/// Restrict a tool name to `[A-Za-z0-9_]` and at most 64 characters.
fn sanitize_tool_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    sanitized.chars().take(64).collect()
}

/// Convert a tool choice into the Google tool config.
fn convert_tool_choice(choice: &ToolChoice) -> ToolConfig {
    match choice {
        ToolChoice::Auto => ToolConfig::auto(),
        ToolChoice::Any => ToolConfig::any(),
        ToolChoice::None => ToolConfig::none(),
        ToolChoice::Tool { name } => ToolConfig::force(name.clone()),
    }
}
