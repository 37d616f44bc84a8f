//! HTTP surface: the Messages endpoint plus the health and model-listing
//! routes.

pub mod health;
pub mod messages;
pub mod models;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Assemble the API router.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/v1/messages", post(messages::handle_messages))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health::health))
}
