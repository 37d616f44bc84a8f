//! Anthropic ⇄ Google format translation.
//!
//! All transforms here are pure except for reads and writes of the
//! process-wide signature cache. The request path composes the schema
//! sanitizers, the content converter, and the thinking utilities; the
//! response path runs in reverse.

pub mod content;
pub mod request;
pub mod response;
pub mod schema;
pub mod thinking;

pub use content::{convert_content_to_parts, convert_role};
pub use request::convert_request;
pub use response::convert_response;
pub use schema::{clean_schema_for_gemini, sanitize_for_antigravity};
