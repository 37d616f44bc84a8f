//! TTL cache for thought signatures.
//!
//! Two maps, one TTL:
//!
//! - `tool_use_id -> signature` restores Gemini `thoughtSignature` values
//!   on tool calls the Anthropic wire does not carry.
//! - `signature -> model family` records which family last produced a
//!   thinking signature, gating cross-family reuse (Gemini rejects
//!   Claude-produced signatures).
//!
//! Entries older than the TTL are logically absent: they are purged on
//! read and removed in bulk by [`SignatureCache::sweep`]. The cache is
//! process-wide and not persisted across restarts.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use crate::constants::{ModelFamily, MIN_SIGNATURE_LENGTH, SIGNATURE_CACHE_TTL};

/// Process-wide signature cache.
///
/// TTL comes from `GEMINI_SIGNATURE_CACHE_TTL_MS` when set.
pub static GLOBAL_SIGNATURE_CACHE: LazyLock<SignatureCache> = LazyLock::new(|| {
    let ttl = std::env::var("GEMINI_SIGNATURE_CACHE_TTL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(SIGNATURE_CACHE_TTL);
    SignatureCache::with_ttl(ttl)
});

struct Entry<T> {
    value: T,
    stored_at: Instant,
}

/// TTL map of tool signatures and signature families.
pub struct SignatureCache {
    ttl: Duration,
    tool_signatures: Mutex<HashMap<String, Entry<String>>>,
    signature_families: Mutex<HashMap<String, Entry<ModelFamily>>>,
}

impl SignatureCache {
    /// Create a cache with the given TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            tool_signatures: Mutex::new(HashMap::new()),
            signature_families: Mutex::new(HashMap::new()),
        }
    }

    /// Record the signature that rode on a tool call.
    ///
    /// No-op when either argument is empty.
    pub fn store_tool_signature(&self, tool_use_id: &str, signature: &str) {
        if tool_use_id.is_empty() || signature.is_empty() {
            return;
        }
        let mut map = self.tool_signatures.lock().expect("signature cache poisoned");
        map.insert(
            tool_use_id.to_string(),
            Entry {
                value: signature.to_string(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Look up the signature for a tool call.
    ///
    /// Expired entries are purged and reported absent.
    pub fn get_tool_signature(&self, tool_use_id: &str) -> Option<String> {
        let mut map = self.tool_signatures.lock().expect("signature cache poisoned");
        match map.get(tool_use_id) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                map.remove(tool_use_id);
                None
            }
            None => None,
        }
    }

    /// Record which model family produced a thinking signature.
    ///
    /// No-op for signatures shorter than `MIN_SIGNATURE_LENGTH`.
    pub fn store_thinking_signature(&self, signature: &str, family: ModelFamily) {
        if signature.len() < MIN_SIGNATURE_LENGTH {
            return;
        }
        let mut map = self
            .signature_families
            .lock()
            .expect("signature cache poisoned");
        map.insert(
            signature.to_string(),
            Entry {
                value: family,
                stored_at: Instant::now(),
            },
        );
    }

    /// Look up the family that produced a signature.
    pub fn lookup_family(&self, signature: &str) -> Option<ModelFamily> {
        let mut map = self
            .signature_families
            .lock()
            .expect("signature cache poisoned");
        match map.get(signature) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.value),
            Some(_) => {
                map.remove(signature);
                None
            }
            None => None,
        }
    }

    /// Whether a signature may be forwarded to the given family.
    ///
    /// An unknown signature is not compatible: cold-cache trust decisions
    /// belong to the caller, which can check [`Self::lookup_family`]
    /// returned `None` explicitly.
    pub fn is_signature_compatible(&self, signature: &str, family: ModelFamily) -> bool {
        self.lookup_family(signature) == Some(family)
    }

    /// Remove all expired entries from both maps.
    pub fn sweep(&self) -> usize {
        let ttl = self.ttl;
        let mut removed = 0;

        let mut tools = self.tool_signatures.lock().expect("signature cache poisoned");
        let before = tools.len();
        tools.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        removed += before - tools.len();
        drop(tools);

        let mut families = self
            .signature_families
            .lock()
            .expect("signature cache poisoned");
        let before = families.len();
        families.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        removed += before - families.len();

        removed
    }

    /// Entry counts `(tool_signatures, signature_families)`, for diagnostics.
    pub fn size(&self) -> (usize, usize) {
        let tools = self.tool_signatures.lock().expect("signature cache poisoned");
        let families = self
            .signature_families
            .lock()
            .expect("signature cache poisoned");
        (tools.len(), families.len())
    }

    /// Drop every entry.
    pub fn clear_all(&self) {
        self.tool_signatures
            .lock()
            .expect("signature cache poisoned")
            .clear();
        self.signature_families
            .lock()
            .expect("signature cache poisoned")
            .clear();
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::with_ttl(SIGNATURE_CACHE_TTL)
    }
}
