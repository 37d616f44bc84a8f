//! Account selection policy.
//!
//! Pure functions over the pool. Sticky selection trades perfect load
//! balance for upstream cache continuity: the current account is
//! preferred while healthy, failover walks the pool round-robin, and a
//! rate-limited pool with a short enough reset asks the caller to wait
//! instead of erroring.

use crate::accounts::pool::{now_ms, Account, AccountPool};
use crate::constants::MAX_WAIT_BEFORE_ERROR_MS;

/// Result of a round-robin pick.
#[derive(Debug, Clone)]
pub struct PickResult {
    /// The selected account, if any is available.
    pub account: Option<Account>,
    /// The index the pool's sticky pointer should move to.
    pub new_index: usize,
}

/// Wait recommendation for the current sticky account.
#[derive(Debug, Clone)]
pub struct WaitDecision {
    /// Whether waiting out the limit is acceptable.
    pub should_wait: bool,
    /// How long the wait would be.
    pub wait_ms: u64,
    /// The account the wait refers to.
    pub account: Option<Account>,
}

/// Outcome of the sticky selection policy.
#[derive(Debug, Clone)]
pub enum StickySelection {
    /// Use this account; the sticky index has been updated.
    Account {
        /// The selected account.
        account: Account,
        /// New sticky index.
        new_index: usize,
    },
    /// Every account is busy but the current one frees up soon; sleep
    /// this long and retry.
    Wait {
        /// Milliseconds to sleep.
        wait_ms: u64,
    },
    /// Nothing can serve the request.
    None,
}

/// Round-robin pick starting after `current_index`, skipping invalid and
/// rate-limited accounts. Updates `last_used` on the pick.
pub fn pick_next(pool: &mut AccountPool, current_index: usize, model: Option<&str>) -> PickResult {
    let count = pool.accounts.len();
    if count == 0 {
        return PickResult {
            account: None,
            new_index: 0,
        };
    }

    let start = current_index.min(count - 1);
    let now = now_ms();

    for offset in 1..=count {
        let idx = (start + offset) % count;
        if pool.accounts[idx].is_available(model, now) {
            pool.accounts[idx].last_used = Some(now);
            return PickResult {
                account: Some(pool.accounts[idx].clone()),
                new_index: idx,
            };
        }
    }

    PickResult {
        account: None,
        new_index: start,
    }
}

/// The current sticky account, if it can serve the model right now.
pub fn get_current_sticky_account(
    pool: &mut AccountPool,
    current_index: usize,
    model: Option<&str>,
) -> Option<Account> {
    let count = pool.accounts.len();
    if count == 0 {
        return None;
    }
    let idx = current_index.min(count - 1);
    let now = now_ms();
    if pool.accounts[idx].is_available(model, now) {
        pool.accounts[idx].last_used = Some(now);
        Some(pool.accounts[idx].clone())
    } else {
        None
    }
}

/// Whether the caller should wait out the current account's rate limit.
///
/// Waiting is acceptable only when the account is not invalid and the
/// limit resets within `MAX_WAIT_BEFORE_ERROR_MS`.
pub fn should_wait_for_current_account(
    pool: &AccountPool,
    current_index: usize,
    model: Option<&str>,
) -> WaitDecision {
    let count = pool.accounts.len();
    if count == 0 {
        return WaitDecision {
            should_wait: false,
            wait_ms: 0,
            account: None,
        };
    }

    let idx = current_index.min(count - 1);
    let account = &pool.accounts[idx];
    let now = now_ms();
    let wait_ms = account.wait_time_ms(model, now);

    WaitDecision {
        should_wait: !account.is_invalid && wait_ms > 0 && wait_ms <= MAX_WAIT_BEFORE_ERROR_MS,
        wait_ms,
        account: Some(account.clone()),
    }
}

/// Sticky selection: prefer the current account, fail over round-robin,
/// or recommend a bounded wait when the whole pool is limited.
pub fn pick_sticky_account(
    pool: &mut AccountPool,
    current_index: usize,
    model: Option<&str>,
) -> StickySelection {
    if let Some(account) = get_current_sticky_account(pool, current_index, model) {
        let count = pool.accounts.len();
        return StickySelection::Account {
            account,
            new_index: current_index.min(count.saturating_sub(1)),
        };
    }

    let picked = pick_next(pool, current_index, model);
    if let Some(account) = picked.account {
        return StickySelection::Account {
            account,
            new_index: picked.new_index,
        };
    }

    let decision = should_wait_for_current_account(pool, current_index, model);
    if decision.should_wait {
        return StickySelection::Wait {
            wait_ms: decision.wait_ms,
        };
    }

    StickySelection::None
}
