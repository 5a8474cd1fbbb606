//! Error taxonomy for the monitoring core

/// Errors surfaced by the aggregation and query operations.
///
/// Duplicate events and detector skips are not errors: the former is
/// reported as [`crate::aggregator::ApplyOutcome::Duplicate`], the latter
/// simply yields no crossings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    #[error("invalid event: {field} {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("no pipelines found for team: {0}")]
    TeamNotFound(String),

    #[error("no runs of {pipeline_id} in the last {days} days")]
    NoRecentRuns { pipeline_id: String, days: u32 },

    #[error("run history is disabled")]
    HistoryDisabled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::Validation {
            field,
            reason: "is missing".to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors caused by a malformed event rather than a query miss
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
