//! Admission control: counters, rules, detectors, and the per-request
//! orchestrator.

pub mod blocklist;
pub mod burst;
pub mod clock;
pub mod counter;
pub mod engine;
pub mod failed_auth;
pub mod orchestrator;
pub mod rules;

pub use blocklist::{BlockEntry, BlockList};
pub use burst::BurstDetector;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{CounterKey, CounterSnapshot, CounterStore};
pub use engine::{DecisionEngine, QuotaDecision};
pub use failed_auth::FailedAuthTracker;
pub use orchestrator::{
    AdmissionController, AdmissionStatus, HealthReport, HealthStatus, RequestContext, Verdict,
};
pub use rules::{RuleCatalog, RuleClass, RuleLimit};
