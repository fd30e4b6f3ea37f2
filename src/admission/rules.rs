//! Rule catalog: request classes and their rate limit ceilings.
//!
//! The catalog is immutable after construction. Built-in defaults cover
//! classes the configuration does not mention, so every [`RuleClass`] always
//! has a limit and an unknown-class lookup cannot occur at request time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::config::{EngineConfig, RuleLimitConfig};

/// Category of an inbound request, chosen by the caller per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleClass {
    /// Login, token issuance, password reset
    Auth,
    /// Authenticated API traffic
    Api,
    /// File and document uploads
    Upload,
    /// Operator/administrative endpoints
    Admin,
    /// Unauthenticated public traffic
    Public,
}

impl RuleClass {
    /// All request classes, in catalog order.
    pub const ALL: [RuleClass; 5] = [
        RuleClass::Auth,
        RuleClass::Api,
        RuleClass::Upload,
        RuleClass::Admin,
        RuleClass::Public,
    ];

    /// Stable string form, used as the counter scope and in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleClass::Auth => "auth",
            RuleClass::Api => "api",
            RuleClass::Upload => "upload",
            RuleClass::Admin => "admin",
            RuleClass::Public => "public",
        }
    }

    /// Built-in limit applied when configuration does not override it.
    fn default_limit(&self) -> RuleLimit {
        match self {
            RuleClass::Auth => RuleLimit::new(5, Duration::from_secs(900)),
            RuleClass::Api => RuleLimit::new(100, Duration::from_secs(60)),
            RuleClass::Upload => RuleLimit::new(20, Duration::from_secs(3600)),
            RuleClass::Admin => RuleLimit::new(30, Duration::from_secs(60)),
            RuleClass::Public => RuleLimit::new(60, Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ceiling and window for one rule class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleLimit {
    /// Maximum requests admitted within one window
    pub max_requests: u64,
    /// Window duration
    pub window: Duration,
}

impl RuleLimit {
    /// Create a new limit.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl From<RuleLimitConfig> for RuleLimit {
    fn from(config: RuleLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }
}

/// Immutable mapping from rule class to rate limit.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    limits: HashMap<RuleClass, RuleLimit>,
}

impl RuleCatalog {
    /// Catalog containing only the built-in defaults.
    pub fn with_defaults() -> Self {
        let limits = RuleClass::ALL
            .iter()
            .map(|class| (*class, class.default_limit()))
            .collect();
        Self { limits }
    }

    /// Build the catalog from validated configuration, applying per-class
    /// overrides on top of the defaults.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut catalog = Self::with_defaults();
        for class in RuleClass::ALL {
            if let Some(override_limit) = config.rule_override(class) {
                catalog.limits.insert(class, override_limit.into());
            }
        }
        catalog
    }

    /// The limit for a rule class. Total by construction.
    pub fn limit_for(&self, class: RuleClass) -> RuleLimit {
        // The constructor seeds every class, so the lookup cannot miss.
        self.limits
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_limit())
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
