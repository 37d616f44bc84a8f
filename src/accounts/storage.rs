//! Account-file persistence.
//!
//! The pool lives in a single JSON file. Loads tolerate a missing file
//! (first run) and reset the in-memory-only invalid flags. Saves are
//! write-behind: mutations enqueue a snapshot on an unbounded channel
//! and a background task coalesces bursts into one atomic write
//! (temp file + rename).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::accounts::pool::{Account, PoolSettings};
use crate::error::{ProxyError, Result};

/// On-disk shape of the account file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountsFile {
    /// Accounts in selection order.
    #[serde(default)]
    pub accounts: Vec<Account>,

    /// Process-wide settings.
    #[serde(default)]
    pub settings: PoolSettings,

    /// Sticky index at last save.
    #[serde(default)]
    pub active_index: usize,
}

/// Loads and saves the account file.
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    /// Create a store for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the account file; a missing file yields the empty default.
    pub fn load(&self) -> Result<AccountsFile> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Account file missing, starting empty");
            return Ok(AccountsFile::default());
        }

        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ProxyError::Storage(format!("read {}: {e}", self.path.display())))?;
        let file: AccountsFile = serde_json::from_str(&text)
            .map_err(|e| ProxyError::Storage(format!("parse {}: {e}", self.path.display())))?;

        info!(
            path = %self.path.display(),
            accounts = file.accounts.len(),
            "Loaded account file"
        );
        Ok(file)
    }

    /// Atomically write the account file.
    pub fn save(&self, file: &AccountsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProxyError::Storage(format!("mkdir {}: {e}", parent.display())))?;
        }

        let text = serde_json::to_string_pretty(file)
            .map_err(|e| ProxyError::Storage(format!("serialize accounts: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)
            .map_err(|e| ProxyError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ProxyError::Storage(format!("rename {}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), "Account file saved");
        Ok(())
    }
}

/// Write-behind save queue.
///
/// Snapshots are cheap clones of the pool state; a burst of mutations
/// collapses into the latest snapshot before hitting disk.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<AccountsFile>,
}

impl SaveQueue {
    /// Spawn the background writer for a store.
    pub fn spawn(store: AccountStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AccountsFile>();

        tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                // Coalesce any queued snapshots into the newest one.
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }
                if let Err(e) = store.save(&snapshot) {
                    error!(error = %e, "Failed to persist account file");
                }
            }
        });

        Self { tx }
    }

    /// Queue a snapshot for persistence.
    pub fn enqueue(&self, snapshot: AccountsFile) {
        // A closed channel only happens at shutdown; losing the final
        // save there is acceptable.
        let _ = self.tx.send(snapshot);
    }
}
