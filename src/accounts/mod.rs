//! Account pool, selection policy, persistence, and the manager that
//! ties them to the credential caches.

pub mod manager;
pub mod pool;
pub mod selector;
pub mod storage;

pub use manager::AccountManager;
pub use pool::{Account, AccountPool, AccountSource, ModelRateLimit, PoolSettings};
pub use selector::{pick_next, pick_sticky_account, StickySelection};
pub use storage::{AccountStore, AccountsFile, SaveQueue};
