//! Core data models for the pipeline monitor

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Terminal outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl FromStr for ExecutionStatus {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "SUCCEEDED" => Ok(ExecutionStatus::Success),
            "FAILED" | "FAILURE" | "TIMEOUT" | "CANCELLED" => Ok(ExecutionStatus::Failure),
            other => Err(MonitorError::invalid(
                "status",
                format!("is not a terminal run status: {:?}", other),
            )),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A single completed pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub pipeline_id: String,
    pub team: String,
    pub status: ExecutionStatus,
    /// Run duration in seconds
    pub duration_secs: f64,
    pub records_processed: i64,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    /// Check the invariants `apply` relies on
    pub fn validate(&self) -> Result<()> {
        if self.execution_id.trim().is_empty() {
            return Err(MonitorError::missing("execution_id"));
        }
        if self.pipeline_id.trim().is_empty() {
            return Err(MonitorError::missing("pipeline_id"));
        }
        if self.team.trim().is_empty() {
            return Err(MonitorError::missing("team"));
        }
        if !self.duration_secs.is_finite() {
            return Err(MonitorError::invalid("duration", "must be finite"));
        }
        if self.duration_secs < 0.0 {
            return Err(MonitorError::invalid(
                "duration",
                format!("must be non-negative, got {}", self.duration_secs),
            ));
        }
        if self.records_processed < 0 {
            return Err(MonitorError::invalid(
                "records_processed",
                format!("must be non-negative, got {}", self.records_processed),
            ));
        }
        Ok(())
    }
}

/// Execution event as it arrives on the wire.
///
/// Every field is optional so that a missing field is reported as a
/// validation error naming it instead of an opaque parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExecutionEvent {
    pub execution_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub team: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "duration_secs")]
    pub duration: Option<f64>,
    pub records_processed: Option<i64>,
    #[serde(alias = "start_time")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawExecutionEvent> for ExecutionEvent {
    type Error = MonitorError;

    fn try_from(raw: RawExecutionEvent) -> Result<Self> {
        let status = raw
            .status
            .ok_or_else(|| MonitorError::missing("status"))?
            .parse()?;

        let event = ExecutionEvent {
            execution_id: raw
                .execution_id
                .ok_or_else(|| MonitorError::missing("execution_id"))?,
            pipeline_id: raw
                .pipeline_id
                .ok_or_else(|| MonitorError::missing("pipeline_id"))?,
            team: raw.team.ok_or_else(|| MonitorError::missing("team"))?,
            status,
            duration_secs: raw.duration.ok_or_else(|| MonitorError::missing("duration"))?,
            records_processed: raw
                .records_processed
                .ok_or_else(|| MonitorError::missing("records_processed"))?,
            timestamp: raw
                .timestamp
                .ok_or_else(|| MonitorError::missing("timestamp"))?,
        };

        event.validate()?;
        Ok(event)
    }
}

/// Metrics tracked per pipeline and compared across peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SuccessRate,
    AvgDuration,
    AvgRecordsProcessed,
}

impl Metric {
    /// Detection order within a run
    pub const ALL: [Metric; 3] = [
        Metric::SuccessRate,
        Metric::AvgDuration,
        Metric::AvgRecordsProcessed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::SuccessRate => "success_rate",
            Metric::AvgDuration => "avg_duration",
            Metric::AvgRecordsProcessed => "avg_records_processed",
        }
    }

    /// Which side of the peer mean is unhealthy
    pub fn bad_direction(&self) -> Direction {
        match self {
            Metric::SuccessRate => Direction::Low,
            Metric::AvgDuration => Direction::High,
            Metric::AvgRecordsProcessed => Direction::Low,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Low,
    High,
}
