//! Per-pipeline running statistics

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExecutionEvent, ExecutionStatus};

/// Incremental mean update: needs only the previous mean and the new count
pub fn running_mean(old_mean: f64, value: f64, new_count: u64) -> f64 {
    old_mean + (value - old_mean) / new_count as f64
}

/// Execution ids already folded into an aggregate.
///
/// Unbounded unless a capacity is given, in which case the oldest ids are
/// forgotten first.
#[derive(Debug, Clone, Default, PartialEq)]
struct AppliedLog {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl AppliedLog {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn contains(&self, execution_id: &str) -> bool {
        self.ids.contains(execution_id)
    }

    fn insert(&mut self, execution_id: &str) {
        if !self.ids.insert(execution_id.to_string()) {
            return;
        }
        if let Some(capacity) = self.capacity {
            self.order.push_back(execution_id.to_string());
            while self.order.len() > capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Mutable running-statistics record for one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineAggregate {
    pipeline_id: String,
    team: String,
    total_count: u64,
    success_count: u64,
    failed_count: u64,
    avg_duration_secs: f64,
    avg_records_processed: f64,
    last_execution_time: Option<DateTime<Utc>>,
    applied: AppliedLog,
}

impl PipelineAggregate {
    pub fn new(
        pipeline_id: impl Into<String>,
        team: impl Into<String>,
        dedup_capacity: Option<usize>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            team: team.into(),
            total_count: 0,
            success_count: 0,
            failed_count: 0,
            avg_duration_secs: 0.0,
            avg_records_processed: 0.0,
            last_execution_time: None,
            applied: AppliedLog::new(dedup_capacity),
        }
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn has_applied(&self, execution_id: &str) -> bool {
        self.applied.contains(execution_id)
    }

    /// Number of execution ids currently remembered for idempotency
    pub fn tracked_executions(&self) -> usize {
        self.applied.len()
    }

    /// Fold one validated event into the running statistics.
    ///
    /// Callers must have checked `has_applied` under the same lock.
    pub fn record(&mut self, event: &ExecutionEvent) {
        self.total_count += 1;
        match event.status {
            ExecutionStatus::Success => self.success_count += 1,
            ExecutionStatus::Failure => self.failed_count += 1,
        }

        self.avg_duration_secs =
            running_mean(self.avg_duration_secs, event.duration_secs, self.total_count);
        self.avg_records_processed = running_mean(
            self.avg_records_processed,
            event.records_processed as f64,
            self.total_count,
        );

        // Out-of-order events still count, but never move the clock back
        match self.last_execution_time {
            Some(last) if event.timestamp <= last => {}
            _ => self.last_execution_time = Some(event.timestamp),
        }

        self.applied.insert(&event.execution_id);
    }

    /// Immutable view for readers
    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            pipeline_id: self.pipeline_id.clone(),
            team: self.team.clone(),
            total_count: self.total_count,
            success_count: self.success_count,
            failed_count: self.failed_count,
            avg_duration_secs: self.avg_duration_secs,
            avg_records_processed: self.avg_records_processed,
            last_execution_time: self.last_execution_time,
        }
    }
}

/// Point-in-time snapshot of a pipeline aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub pipeline_id: String,
    pub team: String,
    pub total_count: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub avg_duration_secs: f64,
    pub avg_records_processed: f64,
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl PipelineHealth {
    /// Fraction of successful runs, `None` when there is no data
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_count as f64)
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(id: &str, status: ExecutionStatus, duration: f64, ts_secs: i64) -> ExecutionEvent {
        ExecutionEvent {
            execution_id: id.to_string(),
            pipeline_id: "orders".to_string(),
            team: "data-eng".to_string(),
            status,
            duration_secs: duration,
            records_processed: 100,
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_running_mean_formula() {
        let mut mean = 0.0;
        for (i, value) in [4.0, 8.0, 15.0, 16.0, 23.0, 42.0].iter().enumerate() {
            mean = running_mean(mean, *value, i as u64 + 1);
        }
        assert!((mean - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_counts_and_rate() {
        let mut agg = PipelineAggregate::new("orders", "data-eng", None);
        assert_eq!(agg.health().success_rate(), None);

        agg.record(&event("a", ExecutionStatus::Success, 10.0, 1));
        agg.record(&event("b", ExecutionStatus::Failure, 20.0, 2));
        agg.record(&event("c", ExecutionStatus::Success, 30.0, 3));

        let health = agg.health();
        assert_eq!(health.total_count, 3);
        assert_eq!(health.success_count + health.failed_count, health.total_count);
        assert!((health.success_rate().unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((health.avg_duration_secs - 20.0).abs() < 1e-9);
        assert_eq!(health.avg_records_processed, 100.0);
    }

    #[test]
    fn test_last_execution_time_is_monotonic() {
        let mut agg = PipelineAggregate::new("orders", "data-eng", None);
        agg.record(&event("late", ExecutionStatus::Success, 10.0, 200));
        agg.record(&event("early", ExecutionStatus::Success, 30.0, 100));

        let health = agg.health();
        assert_eq!(health.last_execution_time.unwrap().timestamp(), 200);
        assert_eq!(health.total_count, 2);
        assert!((health.avg_duration_secs - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounded_applied_log_evicts_oldest() {
        let mut agg = PipelineAggregate::new("orders", "data-eng", Some(2));
        agg.record(&event("a", ExecutionStatus::Success, 1.0, 1));
        agg.record(&event("b", ExecutionStatus::Success, 1.0, 2));
        agg.record(&event("c", ExecutionStatus::Success, 1.0, 3));

        assert_eq!(agg.tracked_executions(), 2);
        assert!(!agg.has_applied("a"));
        assert!(agg.has_applied("b"));
        assert!(agg.has_applied("c"));
    }
}
