//! Fixed-window counter store.
//!
//! The store maps a composite key (purpose, identifier) to a windowed counter
//! with an expiry. Counting is fixed-window: a fresh entry is created on the
//! first event for a key, incremented in place within the window, and
//! replaced once the window has expired. Traffic that straddles a window
//! boundary can therefore exceed the ceiling by at most one extra window's
//! worth of requests, in exchange for O(1) memory and O(1) cost per event.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::clock::Clock;
use crate::error::{GatekeeperError, Result};

/// A key that uniquely identifies one counter.
///
/// `scope` names the purpose of the counter (a rule class, a detector
/// bucket); `identifier` is the caller fingerprint supplied per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Purpose of this counter
    pub scope: String,
    /// Caller fingerprint
    pub identifier: String,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(scope: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.identifier)
    }
}

/// A live counter entry.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    window_start: u64,
    expires_at: u64,
}

impl CounterEntry {
    fn fresh(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_start: now,
            expires_at: now + window_ms,
        }
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            count: self.count,
            window_start: self.window_start,
            expires_at: self.expires_at,
        }
    }
}

/// Point-in-time view of a counter, returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Events observed in the current window
    pub count: u64,
    /// When the current window opened, epoch milliseconds
    pub window_start: u64,
    /// When the current window closes, epoch milliseconds
    pub expires_at: u64,
}

impl CounterSnapshot {
    /// Window close time in whole epoch seconds, rounded up so callers never
    /// retry before the window has actually reset.
    pub fn reset_at_secs(&self) -> u64 {
        self.expires_at.div_ceil(1000)
    }
}

/// Concurrency-safe table of fixed-window counters.
///
/// The read-modify-write on an entry happens under a single shard lock of the
/// underlying concurrent map, so concurrent increments for the same key are
/// never lost. Checks for independent identifiers proceed on independent
/// shards.
pub struct CounterStore {
    entries: DashMap<CounterKey, CounterEntry>,
    clock: Arc<dyn Clock>,
    max_keys: usize,
}

impl CounterStore {
    /// Create a new store bounded to `max_keys` live counters.
    pub fn new(clock: Arc<dyn Clock>, max_keys: usize) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_keys,
        }
    }

    /// Atomically increment the counter for `key`, creating or replacing the
    /// entry when none is live for the current window.
    ///
    /// Returns [`GatekeeperError::StoreExhausted`] when the key is new and
    /// the store is at capacity. The capacity check is advisory: concurrent
    /// first-time inserts may overshoot the bound by a few entries.
    pub fn increment_or_create(&self, key: CounterKey, window: Duration) -> Result<CounterSnapshot> {
        let now = self.clock.now_millis();
        let window_ms = window.as_millis().max(1) as u64;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_keys {
            return Err(GatekeeperError::StoreExhausted(self.max_keys));
        }

        let snapshot = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now >= entry.expires_at {
                    *entry = CounterEntry::fresh(now, window_ms);
                } else {
                    entry.count += 1;
                }
                entry.snapshot()
            }
            Entry::Vacant(vacant) => vacant.insert(CounterEntry::fresh(now, window_ms)).snapshot(),
        };

        trace!(
            count = snapshot.count,
            expires_at = snapshot.expires_at,
            "Counter incremented"
        );

        Ok(snapshot)
    }

    /// Read the live counter for `key` without counting an event.
    ///
    /// Expired entries are reported as absent.
    pub fn peek(&self, key: &CounterKey) -> Option<CounterSnapshot> {
        let now = self.clock.now_millis();
        self.entries.get(key).and_then(|entry| {
            if now >= entry.expires_at {
                None
            } else {
                Some(entry.snapshot())
            }
        })
    }

    /// Explicitly clear the counter for `key`, live or not.
    pub fn reset(&self, key: &CounterKey) {
        self.entries.remove(key);
    }

    /// Remove expired entries, returning how many were collected.
    ///
    /// Removal proceeds shard by shard; no lock is held across the whole
    /// table, so in-flight increments on other shards are not delayed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries currently held, including expired ones not yet
    /// swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
