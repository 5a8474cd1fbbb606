//! Observability infrastructure for the pipeline monitor
//!
//! Provides:
//! - Prometheus metrics (ingest counters, detection latency, alert volume)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::anomaly::{Alert, AlertSeverity};

/// Histogram buckets for detection pass latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    events_applied: IntCounter,
    events_duplicate: IntCounter,
    events_rejected: IntCounter,
    pipelines_tracked: IntGauge,
    detection_latency_seconds: Histogram,
    detection_runs: IntCounter,
    alerts_emitted: IntCounterVec,
    alerts_suppressed: IntCounter,
    sink_failures: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            events_applied: register_int_counter!(
                "pipewatch_events_applied_total",
                "Execution events applied to pipeline aggregates"
            )
            .expect("Failed to register events_applied_total"),

            events_duplicate: register_int_counter!(
                "pipewatch_events_duplicate_total",
                "Execution events skipped because their execution id was already applied"
            )
            .expect("Failed to register events_duplicate_total"),

            events_rejected: register_int_counter!(
                "pipewatch_events_rejected_total",
                "Execution events rejected by validation"
            )
            .expect("Failed to register events_rejected_total"),

            pipelines_tracked: register_int_gauge!(
                "pipewatch_pipelines_tracked",
                "Number of pipelines with a live aggregate"
            )
            .expect("Failed to register pipelines_tracked"),

            detection_latency_seconds: register_histogram!(
                "pipewatch_detection_latency_seconds",
                "Time spent on one detect-classify-route pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_latency_seconds"),

            detection_runs: register_int_counter!(
                "pipewatch_detection_runs_total",
                "Completed detection passes"
            )
            .expect("Failed to register detection_runs_total"),

            alerts_emitted: register_int_counter_vec!(
                "pipewatch_alerts_emitted_total",
                "Alerts that survived deduplication, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_emitted_total"),

            alerts_suppressed: register_int_counter!(
                "pipewatch_alerts_suppressed_total",
                "Alerts dropped by the cross-run suppression window"
            )
            .expect("Failed to register alerts_suppressed_total"),

            sink_failures: register_int_counter!(
                "pipewatch_sink_failures_total",
                "Failed alert dispatches"
            )
            .expect("Failed to register sink_failures_total"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn inc_events_applied(&self) {
        self.inner().events_applied.inc();
    }

    pub fn inc_events_duplicate(&self) {
        self.inner().events_duplicate.inc();
    }

    pub fn inc_events_rejected(&self) {
        self.inner().events_rejected.inc();
    }

    pub fn set_pipelines_tracked(&self, count: usize) {
        self.inner().pipelines_tracked.set(count as i64);
    }

    /// Record one finished detection pass
    pub fn observe_detection(&self, duration_secs: f64) {
        self.inner().detection_latency_seconds.observe(duration_secs);
        self.inner().detection_runs.inc();
    }

    pub fn inc_alerts_emitted(&self, severity: AlertSeverity, count: usize) {
        self.inner()
            .alerts_emitted
            .with_label_values(&[severity.as_str()])
            .inc_by(count as u64);
    }

    pub fn inc_alerts_suppressed(&self, count: usize) {
        self.inner().alerts_suppressed.inc_by(count as u64);
    }

    pub fn inc_sink_failures(&self) {
        self.inner().sink_failures.inc();
    }
}

/// Structured logger for monitor events
///
/// Keeps the `event = "..."` field consistent across the ingest path,
/// detection passes and alert output.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log an execution event that failed validation
    pub fn log_event_rejected(&self, line: Option<usize>, reason: &str) {
        warn!(
            event = "execution_rejected",
            instance = %self.instance,
            line = ?line,
            reason = %reason,
            "Rejected execution event"
        );
    }

    /// Log the result of a batch load
    pub fn log_ingest_complete(
        &self,
        source: &str,
        applied: usize,
        duplicates: usize,
        rejected: usize,
    ) {
        info!(
            event = "ingest_complete",
            instance = %self.instance,
            source = %source,
            applied = applied,
            duplicates = duplicates,
            rejected = rejected,
            "Finished loading execution events"
        );
    }

    /// Log a finished detection pass
    pub fn log_detection_run(
        &self,
        pipelines: usize,
        crossings: usize,
        alerts: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "detection_run",
            instance = %self.instance,
            pipelines = pipelines,
            crossings = crossings,
            alerts = alerts,
            elapsed_ms = elapsed_ms,
            "Detection pass complete"
        );
    }

    /// Log a routed alert
    pub fn log_alert(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                warn!(
                    event = "pipeline_anomaly",
                    instance = %self.instance,
                    pipeline_id = %alert.pipeline_id,
                    team = %alert.team,
                    metric = %alert.metric,
                    severity = %alert.severity,
                    observed = alert.observed,
                    peer_mean = alert.peer_mean,
                    peer_stdev = alert.peer_stdev,
                    deviation = alert.deviation,
                    "{}",
                    alert.message
                );
            }
            _ => {
                info!(
                    event = "pipeline_anomaly",
                    instance = %self.instance,
                    pipeline_id = %alert.pipeline_id,
                    team = %alert.team,
                    metric = %alert.metric,
                    severity = %alert.severity,
                    observed = alert.observed,
                    peer_mean = alert.peer_mean,
                    peer_stdev = alert.peer_stdev,
                    deviation = alert.deviation,
                    "{}",
                    alert.message
                );
            }
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            "Pipeline monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Pipeline monitor shutting down"
        );
    }
}
