//! Per-vault exclusive locks.
//!
//! The table is owned by the coordinator's control thread and is only ever
//! touched from there, so it needs no interior synchronization. It never
//! blocks or queues: an acquire on a held key simply fails.

use crate::types::VaultKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Holder label used while a save is being persisted
pub const SAVE_HOLDER: &str = "save";

/// Holder label used while a delete is being persisted
pub const DELETE_HOLDER: &str = "delete";

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Proof of lock ownership.
///
/// The label names the holder for diagnostics; the serial is unique per token
/// so a stale token can never match a newer lock on the same key, even when
/// both carry the same label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken {
    holder: String,
    serial: u64,
}

impl LockToken {
    /// Mint a fresh token for `holder`
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Token marking an in-progress save
    pub fn save() -> Self {
        Self::new(SAVE_HOLDER)
    }

    /// Token marking an in-progress delete
    pub fn delete() -> Self {
        Self::new(DELETE_HOLDER)
    }

    /// Holder label
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.holder)
    }
}

#[derive(Debug)]
struct LockEntry {
    token: LockToken,
    acquired_at: Instant,
}

/// Mapping of locked vaults to their current holder
#[derive(Debug, Default)]
pub struct LockTable {
    entries: HashMap<VaultKey, LockEntry>,
    lease: Option<Duration>,
}

impl LockTable {
    /// Table whose locks never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose locks may be taken over once older than `lease`
    pub fn with_lease(lease: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            lease,
        }
    }

    /// Lock `key` for `token` if it is free.
    ///
    /// An entry older than the lease counts as free and is evicted.
    pub fn try_acquire(&mut self, key: &VaultKey, token: LockToken) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if !self.is_expired(entry) {
                return false;
            }
            tracing::warn!(
                key = %key,
                holder = %entry.token,
                held_for = ?entry.acquired_at.elapsed(),
                "evicting expired vault lock"
            );
            if let Some(metrics) = crate::system::metrics::global() {
                metrics.lease_evictions.inc();
            }
        }
        self.entries.insert(
            key.clone(),
            LockEntry {
                token,
                acquired_at: Instant::now(),
            },
        );
        true
    }

    /// Unlock `key` if it is held by `expected`; otherwise do nothing
    pub fn release(&mut self, key: &VaultKey, expected: &LockToken) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.token == *expected => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Hand the lock on `key` from `expected` to `replacement`.
    ///
    /// The lease restarts for the new holder.
    pub fn reassert(&mut self, key: &VaultKey, expected: &LockToken, replacement: LockToken) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.token == *expected => {
                entry.token = replacement;
                entry.acquired_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Current holder of `key`, ignoring expiry
    pub fn holder(&self, key: &VaultKey) -> Option<&LockToken> {
        self.entries.get(key).map(|entry| &entry.token)
    }

    /// True if `key` is held
    pub fn is_locked(&self, key: &VaultKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of held locks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is locked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &LockEntry) -> bool {
        self.lease
            .map_or(false, |lease| entry.acquired_at.elapsed() >= lease)
    }
}
