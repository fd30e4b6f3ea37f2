//! Configuration management for the Gatekeeper engine.
//!
//! All configuration is static: it is loaded once at process start, validated,
//! and never mutated at runtime. Abuse thresholds that would silently degrade
//! if misconfigured (zero-width windows, zero ceilings) are rejected by
//! [`EngineConfig::validate`] before the engine is constructed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::admission::rules::RuleClass;
use crate::error::{GatekeeperError, Result};

/// Main configuration for the Gatekeeper engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-class rate limit overrides. Classes not listed here use the
    /// built-in defaults from the rule catalog.
    #[serde(default)]
    pub rules: HashMap<RuleClass, RuleLimitConfig>,

    /// Burst detection configuration
    #[serde(default)]
    pub burst: BurstConfig,

    /// Failed-authentication tracking configuration
    #[serde(default)]
    pub failed_auth: FailedAuthConfig,

    /// Security alert configuration
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Token required by the operator control surface. Reported as a health
    /// issue when absent.
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Rate limit for a single rule class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleLimitConfig {
    /// Maximum requests admitted within one window
    pub max_requests: u64,
    /// Window duration in seconds
    pub window_secs: u64,
}

/// Burst detection configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Width of the burst detection window in seconds
    #[serde(default = "default_burst_window_secs")]
    pub window_secs: u64,

    /// Observations within one window above which an identifier is
    /// classified as bursting
    #[serde(default = "default_burst_ceiling")]
    pub ceiling: u64,

    /// Duration of the block applied to a bursting identifier, in seconds
    #[serde(default = "default_burst_block_secs")]
    pub block_secs: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            window_secs: default_burst_window_secs(),
            ceiling: default_burst_ceiling(),
            block_secs: default_burst_block_secs(),
        }
    }
}

fn default_burst_window_secs() -> u64 {
    10
}

fn default_burst_ceiling() -> u64 {
    50
}

fn default_burst_block_secs() -> u64 {
    3600
}

/// Failed-authentication tracking configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailedAuthConfig {
    /// Failures within one window that trigger escalation
    #[serde(default = "default_failed_auth_threshold")]
    pub threshold: u64,

    /// Window duration in seconds
    #[serde(default = "default_failed_auth_window_secs")]
    pub window_secs: u64,
}

impl Default for FailedAuthConfig {
    fn default() -> Self {
        Self {
            threshold: default_failed_auth_threshold(),
            window_secs: default_failed_auth_window_secs(),
        }
    }
}

fn default_failed_auth_threshold() -> u64 {
    5
}

fn default_failed_auth_window_secs() -> u64 {
    900
}

/// Security alert configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// How long alerts are retained before pruning, in hours
    #[serde(default = "default_alert_retention_hours")]
    pub retention_hours: u64,

    /// Depth of the bounded critical-alert notification queue
    #[serde(default = "default_notification_queue_depth")]
    pub notification_queue_depth: usize,

    /// Out-of-band notification target for critical alerts (e.g. a pager
    /// service or webhook name). Notification is best-effort; when unset,
    /// critical alerts are still recorded and logged.
    #[serde(default)]
    pub notification_target: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_alert_retention_hours(),
            notification_queue_depth: default_notification_queue_depth(),
            notification_target: None,
        }
    }
}

fn default_alert_retention_hours() -> u64 {
    72
}

fn default_notification_queue_depth() -> usize {
    128
}

/// Counter store configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on live counter keys. Protects memory when identifiers
    /// are attacker-controlled.
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Policy applied to an admission check when the store cannot accept a
    /// new key
    #[serde(default)]
    pub on_exhaustion: FailPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            on_exhaustion: FailPolicy::default(),
        }
    }
}

fn default_max_keys() -> usize {
    100_000
}

/// Policy for admission checks that cannot reach the counter store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// Admit the request without consuming quota
    Open,
    /// Deny the request with reason `unavailable`
    #[default]
    Closed,
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, failing fast on values that would
    /// silently disable a detector at request time.
    pub fn validate(&self) -> Result<()> {
        for (class, limit) in &self.rules {
            if limit.max_requests == 0 {
                return Err(GatekeeperError::Config(format!(
                    "rule class '{}' must allow at least one request per window",
                    class
                )));
            }
            if limit.window_secs == 0 {
                return Err(GatekeeperError::Config(format!(
                    "rule class '{}' must have a non-zero window",
                    class
                )));
            }
        }

        if self.burst.ceiling == 0 {
            return Err(GatekeeperError::Config(
                "burst ceiling must be at least 1".to_string(),
            ));
        }
        if self.burst.window_secs == 0 || self.burst.block_secs == 0 {
            return Err(GatekeeperError::Config(
                "burst window and block duration must be non-zero".to_string(),
            ));
        }

        if self.failed_auth.threshold == 0 {
            return Err(GatekeeperError::Config(
                "failed-auth threshold must be at least 1".to_string(),
            ));
        }
        if self.failed_auth.window_secs == 0 {
            return Err(GatekeeperError::Config(
                "failed-auth window must be non-zero".to_string(),
            ));
        }

        if self.store.max_keys == 0 {
            return Err(GatekeeperError::Config(
                "counter store capacity must be at least 1".to_string(),
            ));
        }
        if self.alerts.notification_queue_depth == 0 {
            return Err(GatekeeperError::Config(
                "notification queue depth must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The limit override for a rule class, if one is configured.
    pub fn rule_override(&self, class: RuleClass) -> Option<RuleLimitConfig> {
        self.rules.get(&class).copied()
    }
}

impl BurstConfig {
    /// Burst window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Burst block duration as a [`Duration`].
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

impl FailedAuthConfig {
    /// Failed-auth window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl AlertConfig {
    /// Alert retention window as a [`Duration`].
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}
