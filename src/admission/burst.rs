//! Burst detection: seconds-scale flood classification per identifier.

use std::sync::Arc;
use tracing::warn;

use super::blocklist::BlockList;
use super::clock::{window_bucket, Clock};
use super::counter::{CounterKey, CounterStore};
use crate::alerts::{AlertKind, AlertManager, Severity};
use crate::config::BurstConfig;

/// Classifies per-identifier floods over a short fixed window and escalates
/// them straight to the block list.
///
/// The counter key embeds the epoch-aligned bucket index, so every window
/// boundary starts a fresh count; stale bucket entries expire and are swept
/// with the rest of the store.
pub struct BurstDetector {
    config: BurstConfig,
    store: Arc<CounterStore>,
    block_list: Arc<BlockList>,
    alerts: Arc<AlertManager>,
    clock: Arc<dyn Clock>,
}

impl BurstDetector {
    /// Create a detector with the given configuration.
    pub fn new(
        config: BurstConfig,
        store: Arc<CounterStore>,
        block_list: Arc<BlockList>,
        alerts: Arc<AlertManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            block_list,
            alerts,
            clock,
        }
    }

    /// Record one observation for `identifier` and report whether it is
    /// exhibiting burst behavior.
    ///
    /// Crossing the ceiling blocks the identifier for the configured
    /// duration and raises a high-severity `burst_traffic` alert. Once
    /// blocked, upstream admission short-circuits before reaching this
    /// detector, so repeated bursts within the block window are idempotent.
    pub async fn observe(&self, identifier: &str) -> bool {
        let bucket = window_bucket(self.clock.now_millis(), self.config.window());
        let key = CounterKey::new(format!("burst#{}", bucket), identifier);

        let snapshot = match self.store.increment_or_create(key, self.config.window()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Degrade to the quota engine's verdict rather than guessing
                warn!(identifier = %identifier, error = %e, "Burst counter unavailable");
                return false;
            }
        };

        if snapshot.count <= self.config.ceiling {
            return false;
        }

        warn!(
            identifier = %identifier,
            count = snapshot.count,
            ceiling = self.config.ceiling,
            "Burst behavior detected"
        );

        self.block_list.block(
            identifier,
            "burst traffic detected",
            Some(self.config.block_duration()),
        );

        if snapshot.count == self.config.ceiling + 1 {
            self.alerts.raise(
                AlertKind::BurstTraffic,
                Severity::High,
                format!(
                    "Identifier {} exceeded {} requests in {}s",
                    identifier, self.config.ceiling, self.config.window_secs
                ),
                serde_json::json!({
                    "identifier": identifier,
                    "observed": snapshot.count,
                    "ceiling": self.config.ceiling,
                    "window_secs": self.config.window_secs,
                    "block_secs": self.config.block_secs,
                }),
            );
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::ManualClock;
    use crate::alerts::{AlertFilter, LogSink};
    use crate::config::AlertConfig;
    use std::time::Duration;

    fn detector() -> (Arc<ManualClock>, Arc<BlockList>, Arc<AlertManager>, BurstDetector) {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(0));
        let store = Arc::new(CounterStore::new(clock.clone(), 4096));
        let block_list = Arc::new(BlockList::new(clock.clone()));
        let alerts = Arc::new(AlertManager::new(
            &AlertConfig::default(),
            clock.clone(),
            Arc::new(LogSink::new(None)),
        ));
        let detector = BurstDetector::new(
            BurstConfig::default(),
            store,
            block_list.clone(),
            alerts.clone(),
            clock.clone(),
        );
        (clock, block_list, alerts, detector)
    }

    #[tokio::test]
    async fn test_under_ceiling_is_not_burst() {
        let (_, block_list, _, detector) = detector();

        for _ in 0..50 {
            assert!(!detector.observe("203.0.113.7").await);
        }
        assert!(!block_list.is_blocked("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_fifty_first_observation_is_burst() {
        let (_, block_list, alerts, detector) = detector();

        for _ in 0..50 {
            detector.observe("203.0.113.7").await;
        }
        assert!(detector.observe("203.0.113.7").await);
        assert!(block_list.is_blocked("203.0.113.7"));

        let raised = alerts.list(
            &AlertFilter {
                kind: Some(AlertKind::BurstTraffic),
                ..Default::default()
            },
            10,
        );
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_burst_block_duration() {
        let (clock, block_list, _, detector) = detector();

        for _ in 0..51 {
            detector.observe("203.0.113.7").await;
        }
        assert!(block_list.is_blocked("203.0.113.7"));

        clock.advance(Duration::from_secs(3600));
        assert!(!block_list.is_blocked("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_window_boundary_resets_count() {
        let (clock, block_list, _, detector) = detector();

        // 49 observations late in one bucket, more early in the next
        clock.set_millis(9_000);
        for _ in 0..49 {
            detector.observe("203.0.113.7").await;
        }
        clock.set_millis(10_500);
        for _ in 0..10 {
            assert!(!detector.observe("203.0.113.7").await);
        }
        assert!(!block_list.is_blocked("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_alert_raised_once_per_burst() {
        let (_, _, alerts, detector) = detector();

        for _ in 0..60 {
            detector.observe("203.0.113.7").await;
        }
        let raised = alerts.list(&AlertFilter::default(), 100);
        assert_eq!(raised.len(), 1);
    }

    #[tokio::test]
    async fn test_identifiers_counted_separately() {
        let (_, block_list, _, detector) = detector();

        for i in 0..60 {
            detector.observe(&format!("198.51.100.{}", i % 4)).await;
        }
        assert!(!block_list.is_blocked("198.51.100.0"));
    }
}
