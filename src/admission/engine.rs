//! Quota decision engine.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

use super::counter::{CounterKey, CounterStore};
use super::rules::{RuleCatalog, RuleClass};
use crate::error::Result;

/// Outcome of a single quota check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaDecision {
    /// Whether the request is within quota
    pub allowed: bool,
    /// Ceiling for this rule class
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the window resets, epoch seconds
    pub reset_at: u64,
    /// Requests observed in the current window, including this one
    pub count: u64,
}

impl QuotaDecision {
    /// Whether the caller has pushed past twice the ceiling within one
    /// window, the threshold for automatic block-list promotion.
    pub fn violation_overflow(&self) -> bool {
        self.count > self.limit.saturating_mul(2)
    }

    /// Whether this decision is the first to cross the overflow threshold.
    pub fn crossed_overflow(&self) -> bool {
        self.count == self.limit.saturating_mul(2) + 1
    }
}

/// Per-request quota engine backed by the counter store and rule catalog.
///
/// Every check consumes quota, allowed or not: a denied caller that keeps
/// retrying cannot probe the limit boundary for free.
pub struct DecisionEngine {
    store: Arc<CounterStore>,
    catalog: RuleCatalog,
}

impl DecisionEngine {
    /// Create a new engine over the given store and catalog.
    pub fn new(store: Arc<CounterStore>, catalog: RuleCatalog) -> Self {
        Self { store, catalog }
    }

    /// Check and consume quota for one request.
    pub async fn check(&self, identifier: &str, class: RuleClass) -> Result<QuotaDecision> {
        let limit = self.catalog.limit_for(class);
        let key = CounterKey::new(class.as_str(), identifier);

        trace!(key = %key, "Checking quota");

        let snapshot = self.store.increment_or_create(key, limit.window)?;

        let decision = QuotaDecision {
            allowed: snapshot.count <= limit.max_requests,
            limit: limit.max_requests,
            remaining: limit.max_requests.saturating_sub(snapshot.count),
            reset_at: snapshot.reset_at_secs(),
            count: snapshot.count,
        };

        if !decision.allowed {
            debug!(
                identifier = %identifier,
                class = %class,
                count = decision.count,
                limit = decision.limit,
                "Quota exceeded"
            );
        }

        Ok(decision)
    }

    /// The catalog this engine was built with.
    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::ManualClock;
    use crate::config::EngineConfig;
    use std::time::Duration;

    fn engine_with_clock() -> (Arc<ManualClock>, DecisionEngine) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(CounterStore::new(clock.clone(), 1024));
        let catalog = RuleCatalog::from_config(&EngineConfig::default());
        (clock, DecisionEngine::new(store, catalog))
    }

    #[tokio::test]
    async fn test_quota_monotonicity() {
        let (_, engine) = engine_with_clock();

        // auth defaults to 5 per 15 minutes
        for expected_remaining in (0..5).rev() {
            let decision = engine.check("203.0.113.7", RuleClass::Auth).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.limit, 5);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = engine.check("203.0.113.7", RuleClass::Auth).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_window_reset_restores_quota() {
        let (clock, engine) = engine_with_clock();

        for _ in 0..6 {
            engine.check("203.0.113.7", RuleClass::Auth).await.unwrap();
        }
        assert!(!engine
            .check("203.0.113.7", RuleClass::Auth)
            .await
            .unwrap()
            .allowed);

        clock.advance(Duration::from_secs(900));

        let decision = engine.check("203.0.113.7", RuleClass::Auth).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_denied_requests_consume_quota() {
        let (clock, engine) = engine_with_clock();

        for _ in 0..5 {
            engine.check("probe", RuleClass::Auth).await.unwrap();
        }
        // Retries past the ceiling keep counting
        let denied = engine.check("probe", RuleClass::Auth).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 6);

        let denied = engine.check("probe", RuleClass::Auth).await.unwrap();
        assert_eq!(denied.count, 7);

        clock.advance(Duration::from_secs(900));
        assert_eq!(engine.check("probe", RuleClass::Auth).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let (_, engine) = engine_with_clock();

        for _ in 0..6 {
            engine.check("noisy", RuleClass::Auth).await.unwrap();
        }
        let decision = engine.check("quiet", RuleClass::Auth).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_classes_are_independent() {
        let (_, engine) = engine_with_clock();

        for _ in 0..6 {
            engine.check("client", RuleClass::Auth).await.unwrap();
        }
        assert!(engine.check("client", RuleClass::Api).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_overflow_threshold() {
        let (_, engine) = engine_with_clock();

        // auth ceiling is 5; overflow starts past 10
        for _ in 0..10 {
            let decision = engine.check("abuser", RuleClass::Auth).await.unwrap();
            assert!(!decision.violation_overflow());
        }

        let decision = engine.check("abuser", RuleClass::Auth).await.unwrap();
        assert!(decision.violation_overflow());
        assert!(decision.crossed_overflow());

        let decision = engine.check("abuser", RuleClass::Auth).await.unwrap();
        assert!(decision.violation_overflow());
        assert!(!decision.crossed_overflow());
    }

    #[tokio::test]
    async fn test_reset_at_reflects_window_close() {
        let (clock, engine) = engine_with_clock();
        clock.set_millis(1_000_500);

        let decision = engine.check("client", RuleClass::Api).await.unwrap();
        // api window is 60s; 1_060_500 ms rounds up to 1_061 s
        assert_eq!(decision.reset_at, 1_061);
    }
}
