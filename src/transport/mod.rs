//! Upstream transport: HTTP client, SSE parsing, and response collection.

pub mod collect;
pub mod http;
pub mod sse;

pub use collect::SseCollector;
pub use http::{mask_token, HttpClient};
pub use sse::SseEventStream;
