//! Security alerting: structured alert records and best-effort notification.

mod manager;
mod sink;

pub use manager::{AlertFilter, AlertKind, AlertManager, SecurityAlert, Severity};
pub use sink::{ChannelSink, LogSink, NotificationSink};
