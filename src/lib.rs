//! Gatekeeper - In-Process Admission Control Engine
//!
//! This crate decides, per inbound request, whether to admit, throttle, or
//! block the caller, and raises structured security alerts when behavioral
//! thresholds are crossed. It is a single-process, in-memory engine intended
//! to run per service instance; the host's request-handling layer constructs
//! one [`AdmissionController`](admission::AdmissionController) at start-up
//! and consults it once per request.
//!
//! ```no_run
//! use gatekeeper::admission::{AdmissionController, RequestContext, RuleClass};
//! use gatekeeper::config::EngineConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> gatekeeper::error::Result<()> {
//! let controller = AdmissionController::new(EngineConfig::default())?;
//!
//! let verdict = controller
//!     .admit("203.0.113.7", RuleClass::Api, &RequestContext::default())
//!     .await;
//! if !verdict.allowed {
//!     // Deny with verdict.reason(), verdict.retry_after_secs, ...
//! }
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod alerts;
pub mod config;
pub mod error;
