//! The `/v1/models` endpoint.
//!
//! Lists the model ids the upstream serves, in the Anthropic list shape,
//! so IDE clients can enumerate them.

use axum::Json;
use serde::Serialize;

use crate::constants::{CLAUDE_MODELS, GEMINI_MODELS};

/// One model entry.
#[derive(Debug, Serialize)]
pub struct ModelEntry {
    /// Always `"model"`.
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    /// Model identifier.
    pub id: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
}

/// The list envelope.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Model entries.
    pub data: Vec<ModelEntry>,
    /// Pagination marker; always false.
    pub has_more: bool,
}

/// GET `/v1/models`.
pub async fn list_models() -> Json<ModelsResponse> {
    let data = CLAUDE_MODELS
        .iter()
        .chain(GEMINI_MODELS.iter())
        .map(|id| ModelEntry {
            entry_type: "model",
            id,
            display_name: id,
        })
        .collect();
    Json(ModelsResponse {
        data,
        has_more: false,
    })
}
