//! Notification sinks for critical alerts.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::error;

use super::manager::SecurityAlert;
use crate::error::{GatekeeperError, Result};

/// Out-of-band delivery target for critical alerts.
///
/// Delivery is best-effort: a failed `notify` is logged by the forwarder task
/// and never surfaces on the admission path.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one alert.
    async fn notify(&self, alert: &SecurityAlert) -> Result<()>;
}

/// Default sink: emits the alert as a structured error-level log event,
/// tagged with the configured notification target so log routing can fan it
/// out.
pub struct LogSink {
    target: Option<String>,
}

impl LogSink {
    /// Create a log sink annotated with the configured target.
    pub fn new(target: Option<String>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, alert: &SecurityAlert) -> Result<()> {
        error!(
            alert_id = %alert.id,
            kind = %alert.kind,
            severity = %alert.severity,
            message = %alert.message,
            target = self.target.as_deref().unwrap_or("unconfigured"),
            "Critical security alert"
        );
        Ok(())
    }
}

/// Sink that forwards alerts over a channel. Used in tests to observe the
/// asynchronous notification path.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SecurityAlert>,
}

impl ChannelSink {
    /// Create a sink and the receiver for alerts it delivers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SecurityAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, alert: &SecurityAlert) -> Result<()> {
        self.tx
            .send(alert.clone())
            .map_err(|_| GatekeeperError::Notification("channel receiver dropped".to_string()))
    }
}
