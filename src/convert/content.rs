//! Content block conversion: Anthropic blocks to Google parts.
//!
//! | Anthropic block | Google part |
//! |-----------------|-------------|
//! | `text` | `{ text }` |
//! | `image`/`document` (base64) | `{ inlineData: { mimeType, data } }` |
//! | `image`/`document` (url) | `{ fileData: { mimeType, fileUri } }` |
//! | `tool_use` | `{ functionCall: { name, args, id? }, thoughtSignature? }` |
//! | `tool_result` | `{ functionResponse: { name, response: { result } } }` |
//! | `thinking` | `{ text, thought: true, thoughtSignature }` |
//! | `redacted_thinking` | never forwarded |
//!
//! Role mapping: `assistant -> model`, everything else -> `user`.

use crate::constants::{
    get_model_family, ModelFamily, GEMINI_SKIP_SIGNATURE, MIN_SIGNATURE_LENGTH,
};
use crate::models::content::{ContentBlock, MediaSource, ToolResultContent};
use crate::models::google::{FileData, FunctionCall, FunctionResponse, InlineData, Part};
use crate::models::request::Role;
use crate::signature::GLOBAL_SIGNATURE_CACHE;

/// Default MIME type for url-sourced images with no declared type.
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Default MIME type for url-sourced documents with no declared type.
const DEFAULT_DOCUMENT_MIME: &str = "application/pdf";

/// Convert an Anthropic role to the Google role string.
pub fn convert_role(role: Role) -> String {
    match role {
        Role::Assistant => "model".to_string(),
        Role::User => "user".to_string(),
    }
}

/// Convert a message's content blocks to an ordered list of Google parts.
///
/// The destination model decides the family-specific behavior: Claude
/// destinations carry call/response ids, Gemini destinations carry
/// thought signatures and drop thinking blocks whose signature is not
/// known to be Gemini-produced.
pub fn convert_content_to_parts(blocks: &[ContentBlock], model: &str) -> Vec<Part> {
    let family = get_model_family(model);
    let is_claude = family == ModelFamily::Claude;
    let is_gemini = family == ModelFamily::Gemini;

    let mut parts = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => {
                if !text.trim().is_empty() {
                    parts.push(Part::text(text));
                }
            }

            ContentBlock::Image { source } => {
                parts.push(media_part(source, DEFAULT_IMAGE_MIME));
            }

            ContentBlock::Document { source } => {
                parts.push(media_part(source, DEFAULT_DOCUMENT_MIME));
            }

            ContentBlock::ToolUse {
                id,
                name,
                input,
                thought_signature,
                ..
            } => {
                let mut call = FunctionCall::new(name, input.clone());
                if is_claude {
                    call.id = Some(id.clone());
                }

                let mut part = Part::function_call(call);
                if is_gemini {
                    // Prefer the signature riding on the block, then the
                    // cache, then the validator-skip sentinel.
                    let signature = thought_signature
                        .clone()
                        .filter(|s| !s.is_empty())
                        .or_else(|| GLOBAL_SIGNATURE_CACHE.get_tool_signature(id))
                        .unwrap_or_else(|| GEMINI_SKIP_SIGNATURE.to_string());
                    part.thought_signature = Some(signature);
                }

                parts.push(part);
            }

            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                let name = if tool_use_id.is_empty() {
                    "unknown"
                } else {
                    tool_use_id.as_str()
                };
                let (result, image_parts) = extract_tool_result(content);

                let mut response = FunctionResponse::new(name, result);
                if is_claude {
                    response.id = Some(tool_use_id.clone());
                }
                parts.push(Part::function_response(response));

                // Embedded images become inline parts right after the
                // functionResponse.
                parts.extend(image_parts);
            }

            ContentBlock::Thinking {
                thinking,
                signature,
                ..
            } => {
                let Some(sig) = signature.as_deref().filter(|s| s.len() >= MIN_SIGNATURE_LENGTH)
                else {
                    continue;
                };
                if is_gemini
                    && !GLOBAL_SIGNATURE_CACHE.is_signature_compatible(sig, ModelFamily::Gemini)
                {
                    // Claude-produced or unknown signatures are rejected by
                    // Gemini; drop the block rather than fail the request.
                    continue;
                }
                parts.push(Part::thought(thinking, Some(sig.to_string())));
            }

            ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => {}
        }
    }

    parts
}

/// Build an inline-data or file-data part from a media source.
fn media_part(source: &MediaSource, default_mime: &str) -> Part {
    match source {
        MediaSource::Base64 { media_type, data } => Part::inline_data(InlineData::new(
            media_type.as_deref().unwrap_or(default_mime),
            data,
        )),
        MediaSource::Url { url, media_type } => Part::file_data(FileData::new(
            media_type.as_deref().unwrap_or(default_mime),
            url,
        )),
    }
}

/// Extract the result text and any embedded image parts from a tool result.
fn extract_tool_result(content: &Option<ToolResultContent>) -> (String, Vec<Part>) {
    match content {
        None => (String::new(), Vec::new()),
        Some(ToolResultContent::Text(text)) => (text.clone(), Vec::new()),
        Some(ToolResultContent::Blocks(blocks)) => {
            let mut texts = Vec::new();
            let mut image_parts = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text, .. } => texts.push(text.clone()),
                    ContentBlock::Image { source } => {
                        image_parts.push(media_part(source, DEFAULT_IMAGE_MIME));
                    }
                    _ => {}
                }
            }

            let result = if texts.is_empty() && !image_parts.is_empty() {
                "Image attached".to_string()
            } else {
                texts.join("\n")
            };

            (result, image_parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_role() {
        assert_eq!(convert_role(Role::User), "user");
        assert_eq!(convert_role(Role::Assistant), "model");
    }

    #[test]
    fn test_text_blocks_skip_empty() {
        let blocks = vec![
            ContentBlock::text(""),
            ContentBlock::text("   "),
            ContentBlock::text("Hello"),
        ];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_tool_use_claude_carries_id() {
        let blocks = vec![ContentBlock::tool_use(
            "toolu_123",
            "get_weather",
            json!({"location": "NYC"}),
        )];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        let call = parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.id.as_deref(), Some("toolu_123"));
        assert!(parts[0].thought_signature.is_none());
    }

    #[test]
    fn test_tool_use_gemini_sentinel_signature() {
        GLOBAL_SIGNATURE_CACHE.clear_all();
        let blocks = vec![ContentBlock::tool_use(
            "toolu_cold",
            "search",
            json!({"q": "rust"}),
        )];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        let call = parts[0].function_call.as_ref().unwrap();
        assert!(call.id.is_none());
        assert_eq!(
            parts[0].thought_signature.as_deref(),
            Some(GEMINI_SKIP_SIGNATURE)
        );
    }

    #[test]
    fn test_tool_use_gemini_prefers_block_signature() {
        let blocks = vec![ContentBlock::tool_use_signed(
            "toolu_sig",
            "search",
            json!({}),
            "block_signature",
        )];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(
            parts[0].thought_signature.as_deref(),
            Some("block_signature")
        );
    }

    #[test]
    fn test_tool_use_gemini_cache_fallback() {
        GLOBAL_SIGNATURE_CACHE.clear_all();
        GLOBAL_SIGNATURE_CACHE.store_tool_signature("toolu_cached", "cached_sig");
        let blocks = vec![ContentBlock::tool_use("toolu_cached", "search", json!({}))];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(parts[0].thought_signature.as_deref(), Some("cached_sig"));
    }

    #[test]
    fn test_tool_result_string_content() {
        let blocks = vec![ContentBlock::tool_result("toolu_1", "Sunny, 72F")];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        let response = parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "toolu_1");
        assert_eq!(response.response.result, "Sunny, 72F");
        assert_eq!(response.id.as_deref(), Some("toolu_1"));
    }

    #[test]
    fn test_tool_result_gemini_no_id() {
        let blocks = vec![ContentBlock::tool_result("toolu_1", "ok")];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert!(parts[0].function_response.as_ref().unwrap().id.is_none());
    }

    #[test]
    fn test_tool_result_blocks_join_text() {
        let blocks = vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: Some(ToolResultContent::Blocks(vec![
                ContentBlock::text("line 1"),
                ContentBlock::text("line 2"),
            ])),
            is_error: None,
            cache_control: None,
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(
            parts[0].function_response.as_ref().unwrap().response.result,
            "line 1\nline 2"
        );
    }

    #[test]
    fn test_tool_result_images_follow_response() {
        let blocks = vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: Some(ToolResultContent::Blocks(vec![
                ContentBlock::text("screenshot:"),
                ContentBlock::image_base64("image/png", "imgdata"),
            ])),
            is_error: None,
            cache_control: None,
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].function_response.is_some());
        assert_eq!(
            parts[1].inline_data.as_ref().unwrap().mime_type,
            "image/png"
        );
    }

    #[test]
    fn test_tool_result_image_only() {
        let blocks = vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: Some(ToolResultContent::Blocks(vec![ContentBlock::image_base64(
                "image/png",
                "imgdata",
            )])),
            is_error: None,
            cache_control: None,
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(
            parts[0].function_response.as_ref().unwrap().response.result,
            "Image attached"
        );
    }

    #[test]
    fn test_tool_result_empty_id_becomes_unknown() {
        let blocks = vec![ContentBlock::tool_result("", "data")];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(parts[0].function_response.as_ref().unwrap().name, "unknown");
    }

    #[test]
    fn test_image_base64_and_url() {
        let blocks = vec![
            ContentBlock::image_base64("image/png", "iVBOR"),
            ContentBlock::image_url("https://example.com/pic"),
        ];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(parts[0].inline_data.as_ref().unwrap().mime_type, "image/png");
        let file = parts[1].file_data.as_ref().unwrap();
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.file_uri, "https://example.com/pic");
    }

    #[test]
    fn test_document_url_default_mime() {
        let blocks = vec![ContentBlock::Document {
            source: MediaSource::Url {
                url: "https://example.com/spec".into(),
                media_type: None,
            },
        }];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5");
        assert_eq!(
            parts[0].file_data.as_ref().unwrap().mime_type,
            "application/pdf"
        );
    }

    #[test]
    fn test_thinking_short_signature_dropped() {
        let blocks = vec![ContentBlock::thinking("hmm", Some("short".into()))];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5-thinking");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_thinking_unsigned_dropped() {
        let blocks = vec![ContentBlock::thinking("hmm", None)];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5-thinking");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_thinking_claude_keeps_signed() {
        let sig = "a".repeat(60);
        let blocks = vec![ContentBlock::thinking("think", Some(sig.clone()))];
        let parts = convert_content_to_parts(&blocks, "claude-sonnet-4-5-thinking");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_thought());
        assert_eq!(parts[0].thought_signature.as_deref(), Some(sig.as_str()));
    }

    #[test]
    fn test_thinking_gemini_requires_known_gemini_signature() {
        GLOBAL_SIGNATURE_CACHE.clear_all();
        let sig = "g".repeat(60);

        // Unknown signature: dropped for a Gemini destination.
        let blocks = vec![ContentBlock::thinking("think", Some(sig.clone()))];
        assert!(convert_content_to_parts(&blocks, "gemini-3-flash").is_empty());

        // Claude-produced signature: still dropped.
        GLOBAL_SIGNATURE_CACHE.store_thinking_signature(&sig, ModelFamily::Claude);
        assert!(convert_content_to_parts(&blocks, "gemini-3-flash").is_empty());

        // Gemini-produced signature: forwarded.
        GLOBAL_SIGNATURE_CACHE.store_thinking_signature(&sig, ModelFamily::Gemini);
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_thought());
    }

    #[test]
    fn test_redacted_thinking_never_forwarded() {
        let blocks = vec![ContentBlock::RedactedThinking {
            data: "opaque".into(),
        }];
        assert!(convert_content_to_parts(&blocks, "claude-sonnet-4-5").is_empty());
        assert!(convert_content_to_parts(&blocks, "gemini-3-flash").is_empty());
    }

    #[test]
    fn test_unknown_blocks_skipped() {
        let blocks = vec![ContentBlock::Unknown, ContentBlock::text("kept")];
        let parts = convert_content_to_parts(&blocks, "gemini-3-flash");
        assert_eq!(parts.len(), 1);
    }
}
