//! Clock abstraction and time-bucketing helpers.
//!
//! Every windowed component takes its notion of "now" from a [`Clock`] so
//! independent engine instances can be driven deterministically in tests.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time for windowed counters and alert timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Current wall-clock time.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.now_millis() as i64).unwrap_or_default()
    }

    /// Current time as whole seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// Index of the fixed window containing `now_millis` for windows of the given
/// width. Windows are aligned to the epoch.
pub fn window_bucket(now_millis: u64, width: Duration) -> u64 {
    let width_ms = width.as_millis().max(1) as u64;
    now_millis / width_ms
}

/// System clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Time only moves when [`advance`](ManualClock::advance) or
/// [`set_millis`](ManualClock::set_millis) is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given epoch milliseconds.
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute epoch-millisecond value.
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
