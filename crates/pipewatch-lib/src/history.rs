//! Bounded recent-run history for trend queries
//!
//! Opt-in and additive: the running aggregates never read from here. Each
//! pipeline keeps at most `capacity` runs, oldest evicted first.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::models::{ExecutionEvent, ExecutionStatus};

/// One remembered run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub timestamp: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub duration_secs: f64,
    pub records_processed: u64,
}

impl From<&ExecutionEvent> for RunSample {
    fn from(event: &ExecutionEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            status: event.status,
            duration_secs: event.duration_secs,
            records_processed: event.records_processed.max(0) as u64,
        }
    }
}

/// Run statistics for one pipeline over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrend {
    pub pipeline_id: String,
    pub days: u32,
    pub total_count: usize,
    pub success_rate: f64,
    pub avg_duration_secs: f64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub avg_records_processed: f64,
}

/// Per-pipeline ring buffers of recent runs
pub struct RunHistory {
    capacity: usize,
    runs: DashMap<String, VecDeque<RunSample>>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remember an applied event
    pub fn record(&self, pipeline_id: &str, sample: RunSample) {
        let mut runs = self.runs.entry(pipeline_id.to_string()).or_default();
        while runs.len() >= self.capacity {
            runs.pop_front();
        }
        runs.push_back(sample);
    }

    /// Number of runs held for a pipeline
    pub fn len(&self, pipeline_id: &str) -> usize {
        self.runs.get(pipeline_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Copy of the runs held for a pipeline, in arrival order
    pub fn samples(&self, pipeline_id: &str) -> Vec<RunSample> {
        self.runs
            .get(pipeline_id)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Trend over runs with `now - days <= timestamp <= now`
    pub fn trend(&self, pipeline_id: &str, days: u32, now: DateTime<Utc>) -> Result<PerformanceTrend> {
        let cutoff = now - Duration::days(i64::from(days));
        let window: Vec<RunSample> = self
            .samples(pipeline_id)
            .into_iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .collect();

        if window.is_empty() {
            return Err(MonitorError::NoRecentRuns {
                pipeline_id: pipeline_id.to_string(),
                days,
            });
        }

        let n = window.len() as f64;
        let successes = window
            .iter()
            .filter(|s| s.status == ExecutionStatus::Success)
            .count();
        // Runs without a recorded duration are left out of the timing stats
        let timed: Vec<f64> = window
            .iter()
            .map(|s| s.duration_secs)
            .filter(|d| *d > 0.0)
            .collect();
        let (avg_duration_secs, min_duration_secs, max_duration_secs) = if timed.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                timed.iter().sum::<f64>() / timed.len() as f64,
                timed.iter().copied().fold(f64::INFINITY, f64::min),
                timed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        Ok(PerformanceTrend {
            pipeline_id: pipeline_id.to_string(),
            days,
            total_count: window.len(),
            success_rate: successes as f64 / n,
            avg_duration_secs,
            min_duration_secs,
            max_duration_secs,
            avg_records_processed: window.iter().map(|s| s.records_processed as f64).sum::<f64>()
                / n,
        })
    }
}
