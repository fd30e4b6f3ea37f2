//! Block list: identifiers denied outright, manually or by escalation.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::Clock;

/// One blocked identifier.
#[derive(Debug, Clone, Serialize)]
pub struct BlockEntry {
    /// The blocked caller fingerprint
    pub identifier: String,
    /// Why the block was applied
    pub reason: String,
    /// When the block was applied, epoch milliseconds
    pub blocked_at: u64,
    /// When the block lapses, epoch milliseconds. `None` means the block is
    /// permanent and requires an explicit unblock.
    pub expires_at: Option<u64>,
}

impl BlockEntry {
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// Seconds until the block lapses, if it does.
    pub fn retry_after_secs(&self, now: u64) -> Option<u64> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_sub(now).div_ceil(1000))
    }
}

/// Concurrency-safe set of blocked identifiers.
///
/// Blocking is idempotent: blocking an already-blocked identifier replaces
/// the existing entry. Unblocking an identifier that is not blocked is a
/// no-op. Expired entries are treated as absent and removed lazily.
pub struct BlockList {
    entries: DashMap<String, BlockEntry>,
    clock: Arc<dyn Clock>,
}

impl BlockList {
    /// Create an empty block list.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Whether `identifier` is currently blocked.
    pub fn is_blocked(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// The live block entry for `identifier`, if any.
    pub fn get(&self, identifier: &str) -> Option<BlockEntry> {
        let now = self.clock.now_millis();
        match self.entries.get(identifier) {
            None => return None,
            Some(entry) => {
                if !entry.is_expired(now) {
                    return Some(entry.clone());
                }
            }
        }
        // Lapsed: collect it now rather than waiting for the sweep
        self.entries
            .remove_if(identifier, |_, entry| entry.is_expired(now));
        None
    }

    /// Block `identifier`, replacing any existing entry. `duration = None`
    /// blocks permanently, pending manual review.
    pub fn block(&self, identifier: &str, reason: &str, duration: Option<Duration>) {
        let now = self.clock.now_millis();
        let entry = BlockEntry {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
            blocked_at: now,
            expires_at: duration.map(|d| now + d.as_millis() as u64),
        };

        info!(
            identifier = %identifier,
            reason = %reason,
            expires_at = ?entry.expires_at,
            "Identifier blocked"
        );

        self.entries.insert(identifier.to_string(), entry);
    }

    /// Remove the block for `identifier`. Returns whether an entry existed.
    pub fn unblock(&self, identifier: &str) -> bool {
        let removed = self.entries.remove(identifier).is_some();
        if removed {
            info!(identifier = %identifier, "Identifier unblocked");
        } else {
            debug!(identifier = %identifier, "Unblock requested for identifier that is not blocked");
        }
        removed
    }

    /// All live block entries.
    pub fn list_blocked(&self) -> Vec<BlockEntry> {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.clone())
            .collect()
    }

    /// Remove lapsed entries, returning how many were collected.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of live block entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether no identifier is currently blocked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
