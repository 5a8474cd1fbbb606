//! Pipeline monitor facade
//!
//! Owns the aggregate store and wires the aggregator, reporter, detector,
//! classifier, router and optional run history together.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::aggregator::{Aggregator, ApplyOutcome};
use crate::anomaly::{AlertClassifier, AlertRouter, AnomalyDetector, Crossing, RoutedAlerts};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::history::{PerformanceTrend, RunHistory, RunSample};
use crate::models::ExecutionEvent;
use crate::observability::MonitorMetrics;
use crate::reporter::{GlobalSummary, HealthReporter, HealthSnapshot, TeamHealth};
use crate::store::{AggregateStore, PipelineHealth};

/// Outcome of one detect-classify-route pass
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub detected_at: DateTime<Utc>,
    /// Pipelines in the snapshot the pass ran on
    pub pipelines: usize,
    pub crossings: usize,
    pub routed: RoutedAlerts,
}

pub struct PipelineMonitor {
    store: Arc<AggregateStore>,
    aggregator: Aggregator,
    reporter: HealthReporter,
    detector: AnomalyDetector,
    classifier: AlertClassifier,
    router: AlertRouter,
    history: Option<RunHistory>,
    metrics: MonitorMetrics,
}

impl PipelineMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(AggregateStore::new(config.shard_count, config.dedup_capacity));
        Ok(Self {
            aggregator: Aggregator::new(store.clone()),
            reporter: HealthReporter::new(store.clone()),
            store,
            classifier: AlertClassifier::new(config.detection.high_delta),
            detector: AnomalyDetector::new(config.detection),
            router: AlertRouter::new(),
            history: config.history_capacity.map(RunHistory::new),
            metrics: MonitorMetrics::new(),
        })
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    pub fn history_enabled(&self) -> bool {
        self.history.is_some()
    }

    /// Apply one event; applied runs are also kept in the run history
    pub fn ingest(&self, event: &ExecutionEvent) -> Result<ApplyOutcome> {
        let outcome = self.aggregator.apply(event)?;
        if outcome == ApplyOutcome::Applied {
            if let Some(history) = &self.history {
                history.record(&event.pipeline_id, RunSample::from(event));
            }
        }
        Ok(outcome)
    }

    pub fn pipeline_health(&self, pipeline_id: &str) -> Result<PipelineHealth> {
        self.reporter.get_pipeline_health(pipeline_id)
    }

    pub fn all_health(&self) -> HealthSnapshot {
        self.reporter.get_all_health()
    }

    pub fn team_health(&self, team: &str) -> Result<TeamHealth> {
        self.reporter.get_team_health(team)
    }

    pub fn all_team_health(&self) -> Vec<TeamHealth> {
        self.reporter.get_all_team_health()
    }

    pub fn global_summary(&self) -> GlobalSummary {
        self.reporter.get_global_summary()
    }

    /// Crossing records for the current state
    pub fn detect(&self) -> Vec<Crossing> {
        self.detector.detect(&self.store.snapshot())
    }

    /// Detect, classify, deduplicate and route against one snapshot
    pub fn detect_and_route(&self, detected_at: DateTime<Utc>) -> DetectionReport {
        let start = Instant::now();

        let snapshot = self.store.snapshot();
        let crossings = self.detector.detect(&snapshot);
        let alerts = self.classifier.classify_all(&crossings, detected_at);
        let routed = self.router.route(alerts);

        self.metrics.observe_detection(start.elapsed().as_secs_f64());
        for (severity, count) in routed.count_by_severity() {
            self.metrics.inc_alerts_emitted(severity, count);
        }

        DetectionReport {
            detected_at,
            pipelines: snapshot.len(),
            crossings: crossings.len(),
            routed,
        }
    }

    pub fn trend(&self, pipeline_id: &str, days: u32, now: DateTime<Utc>) -> Result<PerformanceTrend> {
        let history = self.history.as_ref().ok_or(MonitorError::HistoryDisabled)?;
        if !self.store.contains(pipeline_id) {
            return Err(MonitorError::PipelineNotFound(pipeline_id.to_string()));
        }
        history.trend(pipeline_id, days, now)
    }
}
