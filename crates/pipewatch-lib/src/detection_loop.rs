//! Periodic detection loop
//!
//! Runs detect-classify-route on a fixed interval and hands non-empty results
//! to an [`AlertSink`] until a shutdown signal arrives.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::anomaly::SuppressionCache;
use crate::monitor::{DetectionReport, PipelineMonitor};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sink::AlertSink;

/// Configuration for the detection loop
#[derive(Debug, Clone)]
pub struct DetectionLoopConfig {
    /// Time between detection passes (default: 60 seconds)
    pub interval: Duration,
    /// Cross-run suppression window; `None` dispatches every run's alerts
    pub suppression_window: Option<Duration>,
}

impl Default for DetectionLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            suppression_window: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Summary of the most recent pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub detected_at: DateTime<Utc>,
    pub pipelines: usize,
    pub crossings: usize,
    pub alerts: usize,
    pub suppressed: usize,
    pub dispatched: bool,
}

/// Shared view of the last detection pass
#[derive(Debug, Clone, Default)]
pub struct DetectionStatus {
    last: Arc<RwLock<Option<RunSummary>>>,
}

impl DetectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, summary: RunSummary) {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(summary);
    }
}

pub struct DetectionLoop {
    monitor: Arc<PipelineMonitor>,
    sink: Arc<dyn AlertSink>,
    config: DetectionLoopConfig,
    suppression: Option<SuppressionCache>,
    status: DetectionStatus,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl DetectionLoop {
    pub fn new(
        monitor: Arc<PipelineMonitor>,
        sink: Arc<dyn AlertSink>,
        config: DetectionLoopConfig,
    ) -> Self {
        Self {
            monitor,
            sink,
            suppression: config.suppression_window.map(SuppressionCache::with_window),
            config,
            status: DetectionStatus::new(),
            logger: StructuredLogger::new("detection-loop"),
            metrics: MonitorMetrics::new(),
        }
    }

    /// Handle for reading the last run from elsewhere (e.g. the health API)
    pub fn status(&self) -> DetectionStatus {
        self.status.clone()
    }

    /// Run until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            suppression_secs = ?self.config.suppression_window.map(|w| w.as_secs()),
            "Starting detection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down detection loop");
                    break;
                }
            }
        }
    }

    /// One detection pass: detect, suppress repeats, dispatch
    pub async fn run_once(&self, now: DateTime<Utc>) -> RunSummary {
        let start = Instant::now();
        let DetectionReport {
            detected_at,
            pipelines,
            crossings,
            mut routed,
        } = self.monitor.detect_and_route(now);

        let suppressed = match &self.suppression {
            Some(cache) => cache.filter(&mut routed),
            None => 0,
        };
        if suppressed > 0 {
            self.metrics.inc_alerts_suppressed(suppressed);
        }

        let dispatched = if routed.is_empty() {
            false
        } else {
            match self.dispatch(&routed).await {
                Ok(()) => {
                    if let Some(cache) = &self.suppression {
                        cache.record(&routed);
                    }
                    true
                }
                Err(e) => {
                    self.metrics.inc_sink_failures();
                    warn!(error = %e, alerts = routed.len(), "Failed to dispatch alerts");
                    false
                }
            }
        };

        self.logger.log_detection_run(
            pipelines,
            crossings,
            routed.len(),
            start.elapsed().as_millis(),
        );

        let summary = RunSummary {
            detected_at,
            pipelines,
            crossings,
            alerts: routed.len(),
            suppressed,
            dispatched,
        };
        self.status.record(summary.clone());
        summary
    }

    async fn dispatch(&self, routed: &crate::anomaly::RoutedAlerts) -> Result<()> {
        self.sink.dispatch(routed).await
    }
}

/// Builder for the detection loop
pub struct DetectionLoopBuilder {
    monitor: Option<Arc<PipelineMonitor>>,
    sink: Option<Arc<dyn AlertSink>>,
    config: DetectionLoopConfig,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            monitor: None,
            sink: None,
            config: DetectionLoopConfig::default(),
        }
    }

    pub fn monitor(mut self, monitor: Arc<PipelineMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn suppression_window(mut self, window: Option<Duration>) -> Self {
        self.config.suppression_window = window;
        self
    }

    pub fn build(self) -> Result<DetectionLoop> {
        let monitor = self
            .monitor
            .ok_or_else(|| anyhow::anyhow!("Monitor is required"))?;
        let sink = self.sink.ok_or_else(|| anyhow::anyhow!("Sink is required"))?;

        Ok(DetectionLoop::new(monitor, sink, self.config))
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::RoutedAlerts;
    use crate::config::MonitorConfig;
    use crate::models::{ExecutionEvent, ExecutionStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Sink that keeps everything it receives
    #[derive(Default)]
    struct CollectingSink {
        received: Mutex<Vec<RoutedAlerts>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl AlertSink for CollectingSink {
        async fn dispatch(&self, routed: &RoutedAlerts) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("webhook unavailable");
            }
            self.received.lock().unwrap().push(routed.clone());
            Ok(())
        }
    }

    fn monitor_with_outlier() -> Arc<PipelineMonitor> {
        let monitor = PipelineMonitor::new(MonitorConfig::default()).unwrap();
        for (pipeline, successes) in [("A", 95), ("B", 96), ("C", 40)] {
            for i in 0..100 {
                let status = if i < successes {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                };
                monitor
                    .ingest(&ExecutionEvent {
                        execution_id: format!("{}-{}", pipeline, i),
                        pipeline_id: pipeline.to_string(),
                        team: "data-eng".to_string(),
                        status,
                        duration_secs: 30.0,
                        records_processed: 100,
                        timestamp: Utc::now(),
                    })
                    .unwrap();
            }
        }
        Arc::new(monitor)
    }

    #[test]
    fn test_detection_loop_config_default() {
        let config = DetectionLoopConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.suppression_window, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_builder_missing_sink() {
        let result = DetectionLoopBuilder::new()
            .monitor(monitor_with_outlier())
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_once_dispatches_then_suppresses() {
        let sink = Arc::new(CollectingSink::default());
        let detection = DetectionLoopBuilder::new()
            .monitor(monitor_with_outlier())
            .sink(sink.clone())
            .build()
            .unwrap();
        let status = detection.status();
        assert!(status.last_run().is_none());

        let first = detection.run_once(Utc::now()).await;
        assert_eq!(first.alerts, 1);
        assert!(first.dispatched);
        assert_eq!(status.last_run().unwrap(), first);

        let second = detection.run_once(Utc::now()).await;
        assert_eq!(second.suppressed, 1);
        assert_eq!(second.alerts, 0);
        assert!(!second.dispatched);

        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_fatal() {
        let sink = Arc::new(CollectingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let detection = DetectionLoopBuilder::new()
            .monitor(monitor_with_outlier())
            .sink(sink.clone())
            .suppression_window(None)
            .build()
            .unwrap();

        let summary = detection.run_once(Utc::now()).await;
        assert_eq!(summary.alerts, 1);
        assert!(!summary.dispatched);

        sink.fail.store(false, Ordering::SeqCst);
        assert!(detection.run_once(Utc::now()).await.dispatched);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_retried_within_window() {
        let sink = Arc::new(CollectingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let detection = DetectionLoopBuilder::new()
            .monitor(monitor_with_outlier())
            .sink(sink.clone())
            .build()
            .unwrap();
        let status = detection.status();

        let first = detection.run_once(Utc::now()).await;
        assert_eq!(first.alerts, 1);
        assert!(!first.dispatched);

        // Still undelivered, so the alert must not be suppressed
        let second = detection.run_once(Utc::now()).await;
        assert_eq!(second.suppressed, 0);
        assert_eq!(second.alerts, 1);
        assert!(!second.dispatched);
        assert!(!status.last_run().unwrap().dispatched);

        sink.fail.store(false, Ordering::SeqCst);
        let third = detection.run_once(Utc::now()).await;
        assert_eq!(third.alerts, 1);
        assert!(third.dispatched);
        assert_eq!(sink.received.lock().unwrap().len(), 1);

        let fourth = detection.run_once(Utc::now()).await;
        assert_eq!(fourth.suppressed, 1);
        assert_eq!(fourth.alerts, 0);
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(CollectingSink::default());
        let detection = DetectionLoopBuilder::new()
            .monitor(monitor_with_outlier())
            .sink(sink.clone())
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let status = detection.status();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(detection.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(status.last_run().is_some());
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }
}
