//! Alert manager: records security alerts and dispatches critical ones.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::sink::NotificationSink;
use crate::admission::clock::Clock;
use crate::config::AlertConfig;

/// Alert severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Alert taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Sustained traffic far past a rate ceiling
    RateLimitAbuse,
    /// Seconds-scale flood from one identifier
    BurstTraffic,
    /// Behavior consistent with credential abuse
    SuspiciousActivity,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::RateLimitAbuse => "rate_limit_abuse",
            AlertKind::BurstTraffic => "burst_traffic",
            AlertKind::SuspiciousActivity => "suspicious_activity",
        };
        f.write_str(s)
    }
}

/// A recorded security alert.
///
/// Alerts are append-only: components raise new alerts, operators resolve
/// them, and nothing else mutates a stored record.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    /// Unique alert identifier
    pub id: Uuid,
    /// Taxonomy entry
    pub kind: AlertKind,
    /// Severity level
    pub severity: Severity,
    /// Human-readable summary
    pub message: String,
    /// Structured context (identifiers, counts, endpoints)
    pub context: serde_json::Value,
    /// When the alert was raised
    pub created_at: DateTime<Utc>,
    /// Whether an operator has resolved the alert
    pub resolved: bool,
}

/// Filter for alert queries. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertFilter {
    /// Match only this taxonomy entry
    pub kind: Option<AlertKind>,
    /// Match only this severity
    pub severity: Option<Severity>,
    /// Match only resolved (or unresolved) alerts
    pub resolved: Option<bool>,
}

impl AlertFilter {
    fn matches(&self, alert: &SecurityAlert) -> bool {
        self.kind.map_or(true, |kind| alert.kind == kind)
            && self.severity.map_or(true, |severity| alert.severity == severity)
            && self.resolved.map_or(true, |resolved| alert.resolved == resolved)
    }
}

/// Records security alerts, exposes query/resolve operations, and hands
/// critical alerts to a bounded asynchronous notification queue.
///
/// Notification is fire-and-forget: the admission path only performs a
/// non-blocking enqueue, and a background forwarder drains the queue to the
/// configured [`NotificationSink`]. A full queue or a failing sink is logged
/// and never affects the caller.
///
/// Must be constructed inside a Tokio runtime (the forwarder task is spawned
/// at construction).
pub struct AlertManager {
    alerts: RwLock<Vec<SecurityAlert>>,
    retention: chrono::Duration,
    clock: Arc<dyn Clock>,
    notify_tx: mpsc::Sender<SecurityAlert>,
}

impl AlertManager {
    /// Create a manager draining critical alerts to `sink`.
    pub fn new(config: &AlertConfig, clock: Arc<dyn Clock>, sink: Arc<dyn NotificationSink>) -> Self {
        let (notify_tx, mut notify_rx) =
            mpsc::channel::<SecurityAlert>(config.notification_queue_depth);

        // Forwarder exits when the manager (and with it the sender) drops.
        tokio::spawn(async move {
            while let Some(alert) = notify_rx.recv().await {
                if let Err(e) = sink.notify(&alert).await {
                    warn!(
                        alert_id = %alert.id,
                        error = %e,
                        "Alert notification failed"
                    );
                }
            }
        });

        Self {
            alerts: RwLock::new(Vec::new()),
            retention: chrono::Duration::seconds(config.retention().as_secs() as i64),
            clock,
            notify_tx,
        }
    }

    /// Record a new alert, returning its id.
    pub fn raise(
        &self,
        kind: AlertKind,
        severity: Severity,
        message: impl Into<String>,
        context: serde_json::Value,
    ) -> Uuid {
        let alert = SecurityAlert {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            context,
            created_at: self.clock.now_utc(),
            resolved: false,
        };

        match severity {
            Severity::Critical => error!(
                alert_id = %alert.id,
                kind = %kind,
                message = %alert.message,
                "Security alert raised"
            ),
            Severity::High => warn!(
                alert_id = %alert.id,
                kind = %kind,
                message = %alert.message,
                "Security alert raised"
            ),
            _ => info!(
                alert_id = %alert.id,
                kind = %kind,
                severity = %severity,
                message = %alert.message,
                "Security alert raised"
            ),
        }

        if severity == Severity::Critical {
            if let Err(e) = self.notify_tx.try_send(alert.clone()) {
                warn!(alert_id = %alert.id, error = %e, "Notification queue full, alert dropped from queue");
            }
        }

        let id = alert.id;
        self.alerts.write().push(alert);
        id
    }

    /// Query alerts, most recent first.
    pub fn list(&self, filter: &AlertFilter, limit: usize) -> Vec<SecurityAlert> {
        self.alerts
            .read()
            .iter()
            .rev()
            .filter(|alert| filter.matches(alert))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Mark an alert resolved. Returns whether the alert exists.
    pub fn resolve(&self, id: Uuid) -> bool {
        let mut alerts = self.alerts.write();
        match alerts.iter_mut().find(|alert| alert.id == id) {
            Some(alert) => {
                alert.resolved = true;
                info!(alert_id = %id, "Alert resolved");
                true
            }
            None => false,
        }
    }

    /// Drop alerts older than the retention window, returning how many were
    /// pruned.
    pub fn prune_expired(&self) -> usize {
        let cutoff = self.clock.now_utc() - self.retention;
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|alert| alert.created_at >= cutoff);
        before - alerts.len()
    }

    /// Count unresolved critical alerts raised at or after `cutoff`.
    pub fn unresolved_critical_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.alerts
            .read()
            .iter()
            .filter(|alert| {
                alert.severity == Severity::Critical
                    && !alert.resolved
                    && alert.created_at >= cutoff
            })
            .count()
    }

    /// Total alerts currently retained.
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Whether no alerts are retained.
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::ManualClock;
    use crate::alerts::sink::{ChannelSink, LogSink};
    use crate::config::AlertConfig;
    use serde_json::json;
    use std::time::Duration;

    // 2024-01-01T00:00:00Z
    const T0_MS: u64 = 1_704_067_200_000;

    fn manager_with_clock() -> (Arc<ManualClock>, AlertManager) {
        let clock = Arc::new(ManualClock::new(T0_MS));
        let manager = AlertManager::new(
            &AlertConfig::default(),
            clock.clone(),
            Arc::new(LogSink::new(None)),
        );
        (clock, manager)
    }

    #[tokio::test]
    async fn test_raise_and_list() {
        let (_, manager) = manager_with_clock();

        manager.raise(
            AlertKind::BurstTraffic,
            Severity::High,
            "burst from 203.0.113.7",
            json!({ "identifier": "203.0.113.7" }),
        );
        manager.raise(
            AlertKind::SuspiciousActivity,
            Severity::High,
            "failed logins",
            json!({}),
        );

        let all = manager.list(&AlertFilter::default(), 10);
        assert_eq!(all.len(), 2);
        // Most recent first
        assert_eq!(all[0].kind, AlertKind::SuspiciousActivity);

        let bursts = manager.list(
            &AlertFilter {
                kind: Some(AlertKind::BurstTraffic),
                ..Default::default()
            },
            10,
        );
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].message, "burst from 203.0.113.7");
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let (_, manager) = manager_with_clock();

        let id = manager.raise(
            AlertKind::RateLimitAbuse,
            Severity::Medium,
            "sustained violations",
            json!({}),
        );

        assert!(manager.resolve(id));
        // Resolving twice still reports the alert as found
        assert!(manager.resolve(id));
        assert!(!manager.resolve(Uuid::new_v4()));

        let unresolved = manager.list(
            &AlertFilter {
                resolved: Some(false),
                ..Default::default()
            },
            10,
        );
        assert!(unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_critical_alert_reaches_sink() {
        let clock = Arc::new(ManualClock::new(T0_MS));
        let (sink, mut rx) = ChannelSink::new();
        let manager = AlertManager::new(&AlertConfig::default(), clock, Arc::new(sink));

        manager.raise(
            AlertKind::SuspiciousActivity,
            Severity::Critical,
            "operator-raised",
            json!({}),
        );

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification not delivered")
            .expect("channel closed");
        assert_eq!(delivered.severity, Severity::Critical);
        assert_eq!(delivered.message, "operator-raised");
    }

    #[tokio::test]
    async fn test_non_critical_alerts_are_not_notified() {
        let clock = Arc::new(ManualClock::new(T0_MS));
        let (sink, mut rx) = ChannelSink::new();
        let manager = AlertManager::new(&AlertConfig::default(), clock, Arc::new(sink));

        manager.raise(AlertKind::BurstTraffic, Severity::High, "burst", json!({}));

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retention_pruning() {
        let (clock, manager) = manager_with_clock();

        manager.raise(AlertKind::BurstTraffic, Severity::High, "old", json!({}));
        clock.advance(Duration::from_secs(73 * 3600));
        manager.raise(AlertKind::BurstTraffic, Severity::High, "fresh", json!({}));

        // Default retention is 72h
        assert_eq!(manager.prune_expired(), 1);
        let remaining = manager.list(&AlertFilter::default(), 10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "fresh");
    }

    #[tokio::test]
    async fn test_unresolved_critical_count() {
        let (clock, manager) = manager_with_clock();

        let stale = manager.raise(
            AlertKind::SuspiciousActivity,
            Severity::Critical,
            "stale",
            json!({}),
        );
        clock.advance(Duration::from_secs(25 * 3600));
        manager.raise(
            AlertKind::SuspiciousActivity,
            Severity::Critical,
            "recent",
            json!({}),
        );
        manager.raise(AlertKind::BurstTraffic, Severity::High, "high", json!({}));

        let cutoff = clock.now_utc() - chrono::Duration::hours(24);
        assert_eq!(manager.unresolved_critical_since(cutoff), 1);

        // Resolving the stale one changes nothing; it is outside the window
        manager.resolve(stale);
        assert_eq!(manager.unresolved_critical_since(cutoff), 1);
    }
}
