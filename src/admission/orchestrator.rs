//! Admission orchestrator: the per-request façade and operator surface.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blocklist::{BlockEntry, BlockList};
use super::burst::BurstDetector;
use super::clock::{Clock, SystemClock};
use super::counter::CounterStore;
use super::engine::DecisionEngine;
use super::failed_auth::FailedAuthTracker;
use super::rules::{RuleCatalog, RuleClass};
use crate::alerts::{
    AlertFilter, AlertKind, AlertManager, LogSink, NotificationSink, SecurityAlert, Severity,
};
use crate::config::{EngineConfig, FailPolicy};
use crate::error::Result;

/// Block duration applied when a caller sustains traffic past twice a rule
/// ceiling within one window.
const OVERFLOW_BLOCK: Duration = Duration::from_secs(30 * 60);

/// Block-list size above which the health check reports a warning.
const BLOCKLIST_WARN_SIZE: usize = 1000;

/// Terminal state of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    /// Within quota, request may proceed
    Admitted,
    /// Over the rule-class ceiling for the current window
    RateLimited,
    /// Identifier is on the block list
    Blocked,
    /// Identifier crossed the burst ceiling on this request
    BurstDetected,
    /// The counter store could not be consulted and policy is fail-closed
    Unavailable,
}

/// The composite verdict returned for every admission check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Verdict {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Why, when it may not
    pub status: AdmissionStatus,
    /// Whether the identifier is on the block list
    pub blocked: bool,
    /// Ceiling for the checked rule class
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window (or block) lapses, epoch seconds
    pub reset_at: u64,
    /// Seconds the caller should wait before retrying, when denied
    pub retry_after_secs: Option<u64>,
}

impl Verdict {
    /// Machine-readable denial reason, `None` when admitted.
    pub fn reason(&self) -> Option<&'static str> {
        match self.status {
            AdmissionStatus::Admitted => None,
            AdmissionStatus::RateLimited => Some("rate_limited"),
            AdmissionStatus::Blocked => Some("blocked"),
            AdmissionStatus::BurstDetected => Some("burst_detected"),
            AdmissionStatus::Unavailable => Some("unavailable"),
        }
    }
}

/// Caller-supplied request metadata, carried into alert context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Account identifier for authenticated flows
    pub account: Option<String>,
    /// Logical endpoint or route being requested
    pub endpoint: Option<String>,
    /// Client-reported user agent
    pub user_agent: Option<String>,
}

/// Overall engine health, computed on demand for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Operator-facing health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Aggregate status
    pub status: HealthStatus,
    /// Problems found, worst first
    pub issues: Vec<String>,
    /// Suggested operator actions, parallel to `issues`
    pub recommendations: Vec<String>,
}

/// The admission controller invoked once per inbound request.
///
/// Checks are sequenced cheapest-first and short-circuit: block list, then
/// burst detector, then quota engine. A request that is both blocked and
/// over quota reports `blocked`, the already-decided and more severe
/// condition, and consumes no quota.
///
/// Construct once at process start and share by reference; independent
/// instances (for tests) are fully isolated. Must be constructed inside a
/// Tokio runtime.
pub struct AdmissionController {
    clock: Arc<dyn Clock>,
    store: Arc<CounterStore>,
    block_list: Arc<BlockList>,
    alerts: Arc<AlertManager>,
    engine: DecisionEngine,
    burst: BurstDetector,
    failed_auth: FailedAuthTracker,
    fail_policy: FailPolicy,
    has_admin_token: bool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionController {
    /// Create a controller with the system clock and the default log-based
    /// notification sink.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let sink = Arc::new(LogSink::new(config.alerts.notification_target.clone()));
        Self::with_parts(config, Arc::new(SystemClock::new()), sink)
    }

    /// Create a controller with an explicit clock and notification sink.
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CounterStore::new(clock.clone(), config.store.max_keys));
        let block_list = Arc::new(BlockList::new(clock.clone()));
        let alerts = Arc::new(AlertManager::new(&config.alerts, clock.clone(), sink));

        let catalog = RuleCatalog::from_config(&config);
        let engine = DecisionEngine::new(store.clone(), catalog);
        let burst = BurstDetector::new(
            config.burst,
            store.clone(),
            block_list.clone(),
            alerts.clone(),
            clock.clone(),
        );
        let failed_auth = FailedAuthTracker::new(
            config.failed_auth,
            store.clone(),
            block_list.clone(),
            alerts.clone(),
        );

        info!(
            max_keys = config.store.max_keys,
            fail_policy = ?config.store.on_exhaustion,
            "Admission controller initialized"
        );

        Ok(Self {
            clock,
            store,
            block_list,
            alerts,
            engine,
            burst,
            failed_auth,
            fail_policy: config.store.on_exhaustion,
            has_admin_token: config.admin_token.is_some(),
            maintenance: Mutex::new(None),
        })
    }

    /// Decide whether one inbound request is admitted.
    pub async fn admit(
        &self,
        identifier: &str,
        class: RuleClass,
        ctx: &RequestContext,
    ) -> Verdict {
        let now_secs = self.clock.now_secs();

        // 1. Block list: already-decided denials consume no quota.
        if let Some(entry) = self.block_list.get(identifier) {
            debug!(identifier = %identifier, reason = %entry.reason, "Request from blocked identifier denied");
            return Verdict {
                allowed: false,
                status: AdmissionStatus::Blocked,
                blocked: true,
                limit: 0,
                remaining: 0,
                reset_at: entry.expires_at.map(|ms| ms.div_ceil(1000)).unwrap_or(0),
                retry_after_secs: entry.retry_after_secs(self.clock.now_millis()),
            };
        }

        // 2. Burst detection: crossing the ceiling blocks the identifier, so
        //    step 1 short-circuits its future requests.
        if self.burst.observe(identifier).await {
            let block_secs = self
                .block_list
                .get(identifier)
                .and_then(|entry| entry.retry_after_secs(self.clock.now_millis()));
            return Verdict {
                allowed: false,
                status: AdmissionStatus::BurstDetected,
                blocked: true,
                limit: 0,
                remaining: 0,
                reset_at: block_secs.map(|secs| now_secs + secs).unwrap_or(0),
                retry_after_secs: block_secs,
            };
        }

        // 3. Quota.
        match self.engine.check(identifier, class).await {
            Ok(decision) if decision.allowed => Verdict {
                allowed: true,
                status: AdmissionStatus::Admitted,
                blocked: false,
                limit: decision.limit,
                remaining: decision.remaining,
                reset_at: decision.reset_at,
                retry_after_secs: None,
            },
            Ok(decision) => {
                warn!(
                    event = "rate_limit",
                    identifier = %identifier,
                    class = %class,
                    count = decision.count,
                    limit = decision.limit,
                    "Rate limit exceeded"
                );

                if decision.violation_overflow() {
                    self.block_list.block(
                        identifier,
                        "sustained rate limit violations",
                        Some(OVERFLOW_BLOCK),
                    );
                    if decision.crossed_overflow() {
                        self.alerts.raise(
                            AlertKind::RateLimitAbuse,
                            Severity::Medium,
                            format!(
                                "Identifier {} exceeded twice the {} ceiling in one window",
                                identifier, class
                            ),
                            serde_json::json!({
                                "identifier": identifier,
                                "class": class.as_str(),
                                "count": decision.count,
                                "limit": decision.limit,
                                "account": ctx.account,
                                "endpoint": ctx.endpoint,
                            }),
                        );
                    }
                }

                Verdict {
                    allowed: false,
                    status: AdmissionStatus::RateLimited,
                    blocked: false,
                    limit: decision.limit,
                    remaining: 0,
                    reset_at: decision.reset_at,
                    retry_after_secs: Some(decision.reset_at.saturating_sub(now_secs)),
                }
            }
            Err(e) => {
                let limit = self.engine.catalog().limit_for(class).max_requests;
                match self.fail_policy {
                    FailPolicy::Open => {
                        warn!(identifier = %identifier, error = %e, "Counter store unavailable, admitting (fail-open)");
                        Verdict {
                            allowed: true,
                            status: AdmissionStatus::Admitted,
                            blocked: false,
                            limit,
                            remaining: 0,
                            reset_at: now_secs,
                            retry_after_secs: None,
                        }
                    }
                    FailPolicy::Closed => {
                        warn!(identifier = %identifier, error = %e, "Counter store unavailable, denying (fail-closed)");
                        Verdict {
                            allowed: false,
                            status: AdmissionStatus::Unavailable,
                            blocked: false,
                            limit,
                            remaining: 0,
                            reset_at: now_secs,
                            retry_after_secs: Some(1),
                        }
                    }
                }
            }
        }
    }

    /// Record the outcome of an authentication attempt for escalation
    /// tracking. Call after the host's credential check, whatever its result.
    pub async fn record_auth_attempt(&self, account: &str, source: &str, success: bool) {
        self.failed_auth.record_attempt(account, source, success).await;
    }

    /// Manually block an identifier until an operator unblocks it.
    pub fn block_identifier(&self, identifier: &str, reason: &str) {
        self.block_list.block(identifier, reason, None);
    }

    /// Remove a block. Returns whether the identifier was blocked.
    pub fn unblock_identifier(&self, identifier: &str) -> bool {
        self.block_list.unblock(identifier)
    }

    /// All currently blocked identifiers.
    pub fn list_blocked(&self) -> Vec<BlockEntry> {
        self.block_list.list_blocked()
    }

    /// Query recorded security alerts, most recent first.
    pub fn list_alerts(&self, filter: &AlertFilter, limit: usize) -> Vec<SecurityAlert> {
        self.alerts.list(filter, limit)
    }

    /// Resolve an alert by id. Returns whether the alert exists.
    pub fn resolve_alert(&self, id: Uuid) -> bool {
        self.alerts.resolve(id)
    }

    /// Compute the operator-facing health report.
    pub fn health_check(&self) -> HealthReport {
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if !self.has_admin_token {
            status = HealthStatus::Warning;
            issues.push("admin token is not configured".to_string());
            recommendations
                .push("set admin_token so the operator surface can be authenticated".to_string());
        }

        let cutoff = self.clock.now_utc() - chrono::Duration::hours(24);
        let critical = self.alerts.unresolved_critical_since(cutoff);
        if critical > 0 {
            status = HealthStatus::Critical;
            issues.push(format!(
                "{} unresolved critical alert(s) in the last 24h",
                critical
            ));
            recommendations.push("investigate and resolve outstanding critical alerts".to_string());
        }

        let blocked = self.block_list.len();
        if blocked > BLOCKLIST_WARN_SIZE {
            if status == HealthStatus::Healthy {
                status = HealthStatus::Warning;
            }
            issues.push(format!("block list holds {} identifiers", blocked));
            recommendations
                .push("review the block list for stale or mistaken entries".to_string());
        }

        HealthReport {
            status,
            issues,
            recommendations,
        }
    }

    /// Start the background maintenance task: sweeps expired counters and
    /// lapsed blocks and prunes aged alerts at the given interval.
    ///
    /// Maintenance only reclaims memory: every read path already treats
    /// expired entries as absent, so the engine is correct without it.
    pub fn start_maintenance(&self, interval: Duration) {
        let store = self.store.clone();
        let block_list = self.block_list.clone();
        let alerts = self.alerts.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = store.sweep_expired();
                let unblocked = block_list.sweep_expired();
                let pruned = alerts.prune_expired();
                if swept + unblocked + pruned > 0 {
                    debug!(
                        counters_swept = swept,
                        blocks_lapsed = unblocked,
                        alerts_pruned = pruned,
                        "Maintenance sweep completed"
                    );
                }
            }
        });

        if let Some(previous) = self.maintenance.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background maintenance task, if running.
    pub fn stop_maintenance(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}
