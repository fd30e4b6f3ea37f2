//! Failed-authentication tracking and escalation.

use std::sync::Arc;
use tracing::{debug, warn};

use super::blocklist::BlockList;
use super::counter::{CounterKey, CounterStore};
use crate::alerts::{AlertKind, AlertManager, Severity};
use crate::config::FailedAuthConfig;

const SCOPE: &str = "failed-auth";

/// Tracks authentication failures per (account, source) pair and escalates
/// repeated failures to a permanent block plus a security alert.
///
/// A successful authentication clears the pair's count outright; this is an
/// explicit reset, not window expiry, so a slow trickle of failures never
/// accumulates across successful logins. Escalation blocks the *source*
/// identifier with no expiry: release requires an operator unblock.
pub struct FailedAuthTracker {
    config: FailedAuthConfig,
    store: Arc<CounterStore>,
    block_list: Arc<BlockList>,
    alerts: Arc<AlertManager>,
}

impl FailedAuthTracker {
    /// Create a tracker with the given configuration.
    pub fn new(
        config: FailedAuthConfig,
        store: Arc<CounterStore>,
        block_list: Arc<BlockList>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            config,
            store,
            block_list,
            alerts,
        }
    }

    /// Record the outcome of one authentication attempt.
    pub async fn record_attempt(&self, account: &str, source: &str, success: bool) {
        let key = CounterKey::new(SCOPE, format!("{}|{}", account, source));

        if success {
            self.store.reset(&key);
            debug!(account = %account, source = %source, "Failed-auth count cleared");
            return;
        }

        let snapshot = match self.store.increment_or_create(key, self.config.window()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(account = %account, source = %source, error = %e, "Failed-auth counter unavailable");
                return;
            }
        };

        debug!(
            account = %account,
            source = %source,
            failures = snapshot.count,
            "Authentication failure recorded"
        );

        if snapshot.count < self.config.threshold {
            return;
        }

        self.block_list
            .block(source, "repeated authentication failures", None);

        if snapshot.count == self.config.threshold {
            self.alerts.raise(
                AlertKind::SuspiciousActivity,
                Severity::High,
                format!(
                    "{} failed authentication attempts for account {} from {}",
                    snapshot.count, account, source
                ),
                serde_json::json!({
                    "account": account,
                    "source": source,
                    "failures": snapshot.count,
                    "window_secs": self.config.window_secs,
                }),
            );
        }
    }
}
