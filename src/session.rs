//! Session-id derivation.
//!
//! The upstream uses the session id to key its prompt cache, so the id
//! must be stable across turns of the same logical conversation. It is
//! derived from the first user message: the text content is hashed with
//! SHA-256 and the first 32 hex characters become the id. Conversations
//! with no usable text get a random UUID instead.

use sha2::{Digest, Sha256};

use crate::models::request::{Message, MessageContent};

/// Derive a stable 32-hex session id from the first user message.
pub fn derive_session_id(messages: &[Message]) -> String {
    let seed = messages
        .iter()
        .find(|m| m.is_user())
        .map(first_message_text)
        .unwrap_or_default();

    if seed.is_empty() {
        return uuid::Uuid::new_v4().to_string();
    }

    let digest = Sha256::digest(seed.as_bytes());
    let hex = format!("{digest:x}");
    hex[..32].to_string()
}

/// Text content of a message: the bare string, or its text blocks joined
/// with newlines.
fn first_message_text(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| b.as_text())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::ContentBlock;

    #[test]
    fn test_deterministic_for_string_content() {
        let messages = vec![Message::user("Hello")];
        let a = derive_session_id(&messages);
        let b = derive_session_id(&messages);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn test_block_content_joined_with_newlines() {
        let blocks = vec![
            Message::user_blocks(vec![
                ContentBlock::text("line 1"),
                ContentBlock::image_base64("image/png", "x"),
                ContentBlock::text("line 2"),
            ]),
        ];
        let joined = vec![Message::user("line 1\nline 2")];
        assert_eq!(derive_session_id(&blocks), derive_session_id(&joined));
    }

    #[test]
    fn test_first_user_message_wins() {
        let a = vec![
            Message::assistant("ignored"),
            Message::user("seed"),
            Message::user("later"),
        ];
        let b = vec![Message::user("seed")];
        assert_eq!(derive_session_id(&a), derive_session_id(&b));
    }

    #[test]
    fn test_empty_content_gets_uuid() {
        let messages = vec![Message::user("")];
        let a = derive_session_id(&messages);
        let b = derive_session_id(&messages);
        // UUIDs are fresh per call and are not 32-hex.
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_no_messages_gets_uuid() {
        let id = derive_session_id(&[]);
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(
            derive_session_id(&[Message::user("a")]),
            derive_session_id(&[Message::user("b")])
        );
    }
}
