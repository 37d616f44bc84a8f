//! Account and pool state, including the per-model rate-limit ledger.
//!
//! The pool is an ordered sequence: round-robin and sticky selection
//! refer to positions, so order is significant and preserved across
//! persistence. Rate-limit entries are timestamps; an entry whose reset
//! time has passed is logically absent and removed by the sweep.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where an account's credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountSource {
    /// Interactive OAuth flow.
    #[default]
    Oauth,
    /// Credential injected from the environment/database fallback.
    Database,
    /// Hand-edited into the account file.
    Manual,
}

/// Rate-limit state for one model on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelRateLimit {
    /// Whether the limit is currently set.
    pub is_rate_limited: bool,

    /// Epoch milliseconds when the limit expires.
    pub reset_time: Option<i64>,
}

impl ModelRateLimit {
    /// Whether the limit is still in force at `now` (epoch ms).
    pub fn is_active(&self, now: i64) -> bool {
        self.is_rate_limited && self.reset_time.is_some_and(|reset| reset > now)
    }
}

/// One upstream Google account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Primary key within the pool.
    pub email: String,

    /// Credential provenance.
    #[serde(default)]
    pub source: AccountSource,

    /// OAuth refresh token. Secret; never logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Alternate API-key credential, when the account was added that way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Discovered or pinned Cloud Code project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Epoch ms when the account was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,

    /// Epoch ms when the account last served a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,

    /// Per-model rate-limit ledger.
    #[serde(default)]
    pub model_rate_limits: HashMap<String, ModelRateLimit>,

    /// Credentials were rejected upstream. Not persisted: accounts get a
    /// fresh chance on reload.
    #[serde(skip)]
    pub is_invalid: bool,

    /// Why the account was marked invalid.
    #[serde(skip)]
    pub invalid_reason: Option<String>,
}

impl Account {
    /// Create an account with the given credential.
    pub fn new(email: impl Into<String>, source: AccountSource, refresh_token: Option<String>) -> Self {
        Self {
            email: email.into(),
            source,
            refresh_token,
            api_key: None,
            project_id: None,
            added_at: Some(now_ms()),
            last_used: None,
            model_rate_limits: HashMap::new(),
            is_invalid: false,
            invalid_reason: None,
        }
    }

    /// Whether the account is rate-limited for a model right now.
    ///
    /// `None` asks about any model.
    pub fn is_rate_limited_for(&self, model: Option<&str>, now: i64) -> bool {
        match model {
            Some(model) => self
                .model_rate_limits
                .get(model)
                .is_some_and(|limit| limit.is_active(now)),
            None => self
                .model_rate_limits
                .values()
                .any(|limit| limit.is_active(now)),
        }
    }

    /// Whether the account can serve a request for a model right now.
    pub fn is_available(&self, model: Option<&str>, now: i64) -> bool {
        !self.is_invalid && !self.is_rate_limited_for(model, now)
    }

    /// Milliseconds until the account's limit for a model expires; zero
    /// when it is not limited.
    pub fn wait_time_ms(&self, model: Option<&str>, now: i64) -> u64 {
        let waits = self
            .model_rate_limits
            .iter()
            .filter(|(id, limit)| {
                limit.is_active(now) && model.is_none_or(|m| m == id.as_str())
            })
            .filter_map(|(_, limit)| limit.reset_time)
            .map(|reset| (reset - now).max(0) as u64);
        waits.max().unwrap_or(0)
    }
}

/// Process-wide settings persisted alongside the accounts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSettings {
    /// Cooldown applied when a 429 carries no reset hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_duration_ms: Option<u64>,

    /// Retry-attempt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// The ordered account pool.
#[derive(Debug, Clone, Default)]
pub struct AccountPool {
    /// Accounts, in selection order.
    pub accounts: Vec<Account>,

    /// Position of the sticky account.
    pub active_index: usize,

    /// Persisted settings.
    pub settings: PoolSettings,
}

impl AccountPool {
    /// Create a pool from loaded state.
    pub fn new(accounts: Vec<Account>, active_index: usize, settings: PoolSettings) -> Self {
        let clamped = if accounts.is_empty() {
            0
        } else {
            active_index.min(accounts.len() - 1)
        };
        Self {
            accounts,
            active_index: clamped,
            settings,
        }
    }

    /// Mark an account rate-limited for a model.
    ///
    /// `reset_ms` falls back to `default_cooldown_ms` when the upstream
    /// gave no usable hint.
    pub fn mark_rate_limited(
        &mut self,
        email: &str,
        model: &str,
        reset_ms: Option<u64>,
        default_cooldown_ms: u64,
    ) {
        let now = now_ms();
        if let Some(account) = self.accounts.iter_mut().find(|a| a.email == email) {
            let delay = reset_ms.unwrap_or(default_cooldown_ms);
            account.model_rate_limits.insert(
                model.to_string(),
                ModelRateLimit {
                    is_rate_limited: true,
                    reset_time: Some(now + delay as i64),
                },
            );
        }
    }

    /// Mark an account's credentials as rejected.
    pub fn mark_invalid(&mut self, email: &str, reason: &str) {
        if let Some(account) = self.accounts.iter_mut().find(|a| a.email == email) {
            account.is_invalid = true;
            account.invalid_reason = Some(reason.to_string());
        }
    }

    /// Whether every non-invalid account is rate-limited for a model.
    ///
    /// `None` means "for any model". An empty (or fully invalid) pool is
    /// not "all rate limited" -- it has no accounts at all.
    pub fn is_all_rate_limited(&self, model: Option<&str>) -> bool {
        let now = now_ms();
        let mut saw_valid = false;
        for account in self.accounts.iter().filter(|a| !a.is_invalid) {
            saw_valid = true;
            if !account.is_rate_limited_for(model, now) {
                return false;
            }
        }
        saw_valid
    }

    /// Sweep expired rate-limit entries. Returns how many were removed.
    pub fn clear_expired_limits(&mut self) -> usize {
        let now = now_ms();
        let mut cleared = 0;
        for account in &mut self.accounts {
            let before = account.model_rate_limits.len();
            account
                .model_rate_limits
                .retain(|_, limit| limit.is_active(now));
            cleared += before - account.model_rate_limits.len();
        }
        cleared
    }

    /// Shortest wait until some rate-limited account frees up for a
    /// model; zero when no account is limited.
    pub fn get_min_wait_time_ms(&self, model: Option<&str>) -> u64 {
        let now = now_ms();
        self.accounts
            .iter()
            .filter(|a| !a.is_invalid && a.is_rate_limited_for(model, now))
            .map(|a| a.wait_time_ms(model, now))
            .filter(|wait| *wait > 0)
            .min()
            .unwrap_or(0)
    }

    /// Accounts that can serve a model right now.
    pub fn available_accounts(&self, model: Option<&str>) -> Vec<&Account> {
        let now = now_ms();
        self.accounts
            .iter()
            .filter(|a| a.is_available(model, now))
            .collect()
    }

    /// Accounts whose credentials were rejected.
    pub fn invalid_accounts(&self) -> Vec<&Account> {
        self.accounts.iter().filter(|a| a.is_invalid).collect()
    }

    /// Forget every rate-limit entry.
    pub fn reset_all_rate_limits(&mut self) {
        for account in &mut self.accounts {
            account.model_rate_limits.clear();
        }
    }
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
