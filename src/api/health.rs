//! The `/health` endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::accounts::manager::AccountStatus;
use crate::AppState;

/// Liveness summary.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Number of configured accounts.
    pub account_count: usize,
    /// Per-account summaries.
    pub accounts: Vec<AccountStatus>,
}

/// GET `/health`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let accounts = state.dispatcher.manager().get_status().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        account_count: accounts.len(),
        accounts,
    })
}
