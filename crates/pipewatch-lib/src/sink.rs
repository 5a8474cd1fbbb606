//! Alert output boundary
//!
//! Notification adapters (chat, pager, webhook) live outside this crate and
//! plug in through [`AlertSink`].

use anyhow::Result;
use async_trait::async_trait;

use crate::anomaly::RoutedAlerts;
use crate::observability::StructuredLogger;

/// Receiver of the routed alerts of a detection run
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one run's team → severity → alerts mapping
    async fn dispatch(&self, routed: &RoutedAlerts) -> Result<()>;
}

/// Writes every alert as a structured log record
pub struct LogSink {
    logger: StructuredLogger,
}

impl LogSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AlertSink for LogSink {
    async fn dispatch(&self, routed: &RoutedAlerts) -> Result<()> {
        for alert in routed.iter() {
            self.logger.log_alert(alert);
        }
        Ok(())
    }
}
