//! The account manager: the dispatcher's single point of contact.
//!
//! Aggregates the pool (selection + rate-limit ledger), the credential
//! caches, and write-behind persistence behind one mutex. Every mutation
//! that changes persisted state enqueues a save; rate-limit and invalid
//! marks become visible to other requests no later than their next
//! selection call.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::accounts::pool::{now_ms, Account, AccountPool, AccountSource};
use crate::accounts::selector::{self, StickySelection};
use crate::accounts::storage::{AccountsFile, SaveQueue};
use crate::auth::credentials::CredentialCache;
use crate::auth::discovery::ProjectDiscovery;
use crate::auth::refresh::TokenRefresher;
use crate::config::Config;
use crate::error::Result;

/// Serializable per-account summary for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    /// Account email.
    pub email: String,
    /// Credential provenance.
    pub source: AccountSource,
    /// Whether the account is currently rate-limited for any model.
    pub rate_limited: bool,
    /// Whether the account's credentials were rejected.
    pub is_invalid: bool,
    /// Why, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Epoch ms of last use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
}

/// Process-wide account aggregator.
pub struct AccountManager {
    pool: Mutex<AccountPool>,
    saves: Option<SaveQueue>,
    credentials: CredentialCache,
    default_cooldown_ms: u64,
}

impl AccountManager {
    /// Build a manager from loaded pool state.
    ///
    /// An empty pool falls back to a single database-sourced account when
    /// `ANTIGRAVITY_REFRESH_TOKEN` is present, so a bare deployment can
    /// still serve.
    pub fn new(
        mut file: AccountsFile,
        saves: Option<SaveQueue>,
        refresher: Arc<dyn TokenRefresher>,
        discovery: Arc<dyn ProjectDiscovery>,
        config: &Config,
    ) -> Self {
        if file.accounts.is_empty() {
            if let Ok(token) = std::env::var("ANTIGRAVITY_REFRESH_TOKEN") {
                info!("Account file empty, using database-sourced fallback account");
                file.accounts.push(Account::new(
                    "database@antigravity.local",
                    AccountSource::Database,
                    Some(token),
                ));
            } else {
                warn!("No accounts configured; requests will fail until one is added");
            }
        }

        if file.accounts.len() > config.max_accounts {
            warn!(
                limit = config.max_accounts,
                loaded = file.accounts.len(),
                "Account file exceeds MAX_ACCOUNTS, truncating"
            );
            file.accounts.truncate(config.max_accounts);
        }

        let default_cooldown_ms = file
            .settings
            .cooldown_duration_ms
            .unwrap_or(config.cooldown_duration.as_millis() as u64);

        let pool = AccountPool::new(file.accounts, file.active_index, file.settings);

        Self {
            pool: Mutex::new(pool),
            saves,
            credentials: CredentialCache::new(refresher, discovery),
            default_cooldown_ms,
        }
    }

    /// Sticky pick for a model; moves the sticky index on failover.
    pub async fn pick_sticky_account(&self, model: Option<&str>) -> StickySelection {
        let mut pool = self.pool.lock().await;
        let current = pool.active_index;
        let selection = selector::pick_sticky_account(&mut pool, current, model);
        if let StickySelection::Account { new_index, .. } = &selection {
            if *new_index != current {
                pool.active_index = *new_index;
            }
        }
        self.enqueue_save(&pool);
        selection
    }

    /// Round-robin advance past the current account.
    pub async fn pick_next(&self, model: Option<&str>) -> Option<Account> {
        let mut pool = self.pool.lock().await;
        let current = pool.active_index;
        let picked = selector::pick_next(&mut pool, current, model);
        pool.active_index = picked.new_index;
        self.enqueue_save(&pool);
        picked.account
    }

    /// The current sticky account, if healthy.
    pub async fn get_current_sticky_account(&self, model: Option<&str>) -> Option<Account> {
        let mut pool = self.pool.lock().await;
        let current = pool.active_index;
        selector::get_current_sticky_account(&mut pool, current, model)
    }

    /// Whether every usable account is rate-limited for a model.
    pub async fn is_all_rate_limited(&self, model: Option<&str>) -> bool {
        self.pool.lock().await.is_all_rate_limited(model)
    }

    /// Shortest wait until a limited account frees up.
    pub async fn get_min_wait_time_ms(&self, model: Option<&str>) -> u64 {
        self.pool.lock().await.get_min_wait_time_ms(model)
    }

    /// Sweep expired rate limits; persists only when something changed.
    pub async fn clear_expired_limits(&self) -> usize {
        let mut pool = self.pool.lock().await;
        let cleared = pool.clear_expired_limits();
        if cleared > 0 {
            self.enqueue_save(&pool);
        }
        cleared
    }

    /// Record a rate limit for an account and model.
    pub async fn mark_rate_limited(&self, email: &str, model: &str, reset_ms: Option<u64>) {
        let mut pool = self.pool.lock().await;
        pool.mark_rate_limited(email, model, reset_ms, self.default_cooldown_ms);
        self.enqueue_save(&pool);
    }

    /// Record rejected credentials for an account.
    pub async fn mark_invalid(&self, email: &str, reason: &str) {
        let mut pool = self.pool.lock().await;
        pool.mark_invalid(email, reason);
        self.enqueue_save(&pool);
    }

    /// Forget every rate limit (diagnostics/admin surface).
    pub async fn reset_all_rate_limits(&self) {
        let mut pool = self.pool.lock().await;
        pool.reset_all_rate_limits();
        self.enqueue_save(&pool);
    }

    /// Live access token for an account.
    pub async fn get_token_for_account(&self, account: &Account) -> Result<String> {
        self.credentials.get_token_for_account(account).await
    }

    /// Project id for an account.
    pub async fn get_project_for_account(&self, account: &Account) -> Result<String> {
        self.credentials.get_project_for_account(account).await
    }

    /// Drop cached tokens.
    pub async fn clear_token_cache(&self, email: Option<&str>) {
        self.credentials.clear_token_cache(email).await;
    }

    /// Drop cached project ids.
    pub async fn clear_project_cache(&self, email: Option<&str>) {
        self.credentials.clear_project_cache(email).await;
    }

    /// Number of accounts in the pool.
    pub async fn get_account_count(&self) -> usize {
        self.pool.lock().await.accounts.len()
    }

    /// Per-account summary for the health surface.
    pub async fn get_status(&self) -> Vec<AccountStatus> {
        let pool = self.pool.lock().await;
        let now = now_ms();
        pool.accounts
            .iter()
            .map(|account| AccountStatus {
                email: account.email.clone(),
                source: account.source,
                rate_limited: account.is_rate_limited_for(None, now),
                is_invalid: account.is_invalid,
                invalid_reason: account.invalid_reason.clone(),
                last_used: account.last_used,
            })
            .collect()
    }

    fn enqueue_save(&self, pool: &AccountPool) {
        if let Some(saves) = &self.saves {
            saves.enqueue(AccountsFile {
                accounts: pool.accounts.clone(),
                settings: pool.settings.clone(),
                active_index: pool.active_index,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::pool::PoolSettings;
    use crate::auth::refresh::RefreshedToken;
    use async_trait::async_trait;

    struct StubRefresher;

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken> {
            Ok(RefreshedToken {
                access_token: "stub-token".into(),
                expires_in: Some(3600),
            })
        }
    }

    struct StubDiscovery;

    #[async_trait]
    impl ProjectDiscovery for StubDiscovery {
        async fn discover(&self, _token: &str, _hint: Option<&str>) -> Result<String> {
            Ok("stub-project".into())
        }
    }

    fn manager_with(accounts: Vec<Account>) -> AccountManager {
        let file = AccountsFile {
            accounts,
            settings: PoolSettings::default(),
            active_index: 0,
        };
        AccountManager::new(
            file,
            None,
            Arc::new(StubRefresher),
            Arc::new(StubDiscovery),
            &Config::default(),
        )
    }

    fn accounts(n: usize) -> Vec<Account> {
        (0..n)
            .map(|i| {
                Account::new(
                    format!("a{i}@example.com"),
                    AccountSource::Oauth,
                    Some("rt".into()),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sticky_selection_and_failover_visibility() {
        let manager = manager_with(accounts(2));

        // First pick: sticky account a0.
        let selection = manager.pick_sticky_account(Some("m")).await;
        let first = match selection {
            StickySelection::Account { account, .. } => account,
            other => panic!("unexpected selection: {other:?}"),
        };
        assert_eq!(first.email, "a0@example.com");

        // Mark a0 limited; the very next pick must see it and fail over.
        manager.mark_rate_limited("a0@example.com", "m", Some(60_000)).await;
        let selection = manager.pick_sticky_account(Some("m")).await;
        match selection {
            StickySelection::Account { account, .. } => {
                assert_eq!(account.email, "a1@example.com");
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sticky_index_persists_across_picks() {
        let manager = manager_with(accounts(3));
        manager.mark_rate_limited("a0@example.com", "m", Some(60_000)).await;

        // Failover moves stickiness to a1...
        let _ = manager.pick_sticky_account(Some("m")).await;
        // ...and a1 stays sticky for the session.
        match manager.pick_sticky_account(Some("m")).await {
            StickySelection::Account { account, .. } => {
                assert_eq!(account.email, "a1@example.com");
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_rate_limited_and_min_wait() {
        let manager = manager_with(accounts(2));
        manager.mark_rate_limited("a0@example.com", "m", Some(60_000)).await;
        manager.mark_rate_limited("a1@example.com", "m", Some(30_000)).await;

        assert!(manager.is_all_rate_limited(Some("m")).await);
        let wait = manager.get_min_wait_time_ms(Some("m")).await;
        assert!(wait > 25_000 && wait <= 30_000, "wait {wait}");

        match manager.pick_sticky_account(Some("m")).await {
            StickySelection::Wait { wait_ms } => assert!(wait_ms <= 60_000),
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_invalid_excludes_account() {
        let manager = manager_with(accounts(2));
        manager.mark_invalid("a0@example.com", "invalid_grant").await;

        match manager.pick_sticky_account(None).await {
            StickySelection::Account { account, .. } => {
                assert_eq!(account.email, "a1@example.com");
            }
            other => panic!("unexpected selection: {other:?}"),
        }

        let status = manager.get_status().await;
        assert!(status[0].is_invalid);
        assert_eq!(status[0].invalid_reason.as_deref(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_clear_expired_limits_counts() {
        let manager = manager_with(accounts(1));
        {
            let mut pool = manager.pool.lock().await;
            pool.accounts[0].model_rate_limits.insert(
                "m".into(),
                crate::accounts::pool::ModelRateLimit {
                    is_rate_limited: true,
                    reset_time: Some(now_ms() - 1000),
                },
            );
        }
        assert_eq!(manager.clear_expired_limits().await, 1);
        assert_eq!(manager.clear_expired_limits().await, 0);
    }

    #[tokio::test]
    async fn test_token_and_project_pass_through() {
        let manager = manager_with(accounts(1));
        let account = manager.get_current_sticky_account(None).await.unwrap();

        assert_eq!(
            manager.get_token_for_account(&account).await.unwrap(),
            "stub-token"
        );
        assert_eq!(
            manager.get_project_for_account(&account).await.unwrap(),
            "stub-project"
        );
    }

    #[tokio::test]
    async fn test_empty_pool_none_selection() {
        let manager = manager_with(vec![]);
        assert_eq!(manager.get_account_count().await, 0);
        assert!(matches!(
            manager.pick_sticky_account(None).await,
            StickySelection::None
        ));
        assert!(!manager.is_all_rate_limited(None).await);
    }

    #[tokio::test]
    async fn test_pick_next_advances() {
        let manager = manager_with(accounts(3));
        let next = manager.pick_next(None).await.unwrap();
        assert_eq!(next.email, "a1@example.com");
        let next = manager.pick_next(None).await.unwrap();
        assert_eq!(next.email, "a2@example.com");
    }
}
