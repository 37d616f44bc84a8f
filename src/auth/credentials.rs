//! Per-account credential caches.
//!
//! Two caches keyed by account email: access tokens (honoring the
//! upstream expiry, with a safety margin) and project ids. Refreshes are
//! guarded per key so a burst of requests for the same account performs
//! one upstream exchange, not a thundering herd.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::accounts::pool::Account;
use crate::auth::discovery::ProjectDiscovery;
use crate::auth::refresh::TokenRefresher;
use crate::error::{ProxyError, Result};

/// Safety margin subtracted from the upstream expiry (seconds).
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Assumed lifetime when the upstream reports none (seconds).
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= self.expires_at
    }
}

/// Token and project caches over the external OAuth collaborators.
pub struct CredentialCache {
    refresher: Arc<dyn TokenRefresher>,
    discovery: Arc<dyn ProjectDiscovery>,
    tokens: Mutex<HashMap<String, CachedToken>>,
    projects: Mutex<HashMap<String, String>>,
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialCache {
    /// Create a cache over the given collaborators.
    pub fn new(refresher: Arc<dyn TokenRefresher>, discovery: Arc<dyn ProjectDiscovery>) -> Self {
        Self {
            refresher,
            discovery,
            tokens: Mutex::new(HashMap::new()),
            projects: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Get a live access token for an account, refreshing when the cache
    /// misses or the cached token is (nearly) expired.
    pub async fn get_token_for_account(&self, account: &Account) -> Result<String> {
        if let Some(cached) = self.tokens.lock().await.get(&account.email) {
            if !cached.is_expired() {
                return Ok(cached.access_token.clone());
            }
        }

        // Serialize refreshes per account.
        let guard = self.key_guard(&format!("token:{}", account.email)).await;
        let _held = guard.lock().await;

        // Another request may have refreshed while we waited.
        if let Some(cached) = self.tokens.lock().await.get(&account.email) {
            if !cached.is_expired() {
                return Ok(cached.access_token.clone());
            }
        }

        let refresh_token = account.refresh_token.as_deref().ok_or_else(|| {
            ProxyError::AuthInvalid {
                account_email: account.email.clone(),
                reason: "account has no refresh token".to_string(),
            }
        })?;

        debug!(email = %account.email, "Refreshing access token");
        let refreshed = self.refresher.refresh(refresh_token).await.map_err(|e| {
            match e {
                // Stamp the account email onto auth failures.
                ProxyError::AuthInvalid { reason, .. } => ProxyError::AuthInvalid {
                    account_email: account.email.clone(),
                    reason,
                },
                other => other,
            }
        })?;

        let lifetime = refreshed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let cached = CachedToken {
            access_token: refreshed.access_token.clone(),
            expires_at: Utc::now().timestamp() + lifetime,
        };
        self.tokens
            .lock()
            .await
            .insert(account.email.clone(), cached);

        Ok(refreshed.access_token)
    }

    /// Get the project id for an account, discovering it on first use.
    ///
    /// A project id pinned on the account short-circuits discovery.
    pub async fn get_project_for_account(&self, account: &Account) -> Result<String> {
        if let Some(pinned) = account.project_id.as_deref().filter(|p| !p.is_empty()) {
            return Ok(pinned.to_string());
        }

        if let Some(project) = self.projects.lock().await.get(&account.email) {
            return Ok(project.clone());
        }

        let guard = self.key_guard(&format!("project:{}", account.email)).await;
        let _held = guard.lock().await;

        if let Some(project) = self.projects.lock().await.get(&account.email) {
            return Ok(project.clone());
        }

        let token = self.get_token_for_account(account).await?;
        let project = self.discovery.discover(&token, None).await?;
        self.projects
            .lock()
            .await
            .insert(account.email.clone(), project.clone());

        Ok(project)
    }

    /// Drop one account's cached token, or all of them.
    pub async fn clear_token_cache(&self, email: Option<&str>) {
        let mut tokens = self.tokens.lock().await;
        match email {
            Some(email) => {
                tokens.remove(email);
            }
            None => tokens.clear(),
        }
    }

    /// Drop one account's cached project, or all of them.
    pub async fn clear_project_cache(&self, email: Option<&str>) {
        let mut projects = self.projects.lock().await;
        match email {
            Some(email) => {
                projects.remove(email);
            }
            None => projects.clear(),
        }
    }

    async fn key_guard(&self, email: &str) -> Arc<Mutex<()>> {
        self.guards
            .lock()
            .await
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
