//! Monitor configuration
//!
//! All values carry explicit defaults so an empty config file (or none at
//! all) yields a working monitor.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::models::Metric;

/// Default number of store partitions
const DEFAULT_SHARD_COUNT: usize = 16;

/// Threshold settings for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    /// Number of peer standard deviations that triggers a crossing (k)
    pub sigma_multiplier: f64,
    /// Stand-in σ when the peer population has zero variance
    #[serde(default)]
    pub fallback_sigma: Option<f64>,
}

impl MetricThresholds {
    pub fn new(sigma_multiplier: f64) -> Self {
        Self {
            sigma_multiplier,
            fallback_sigma: None,
        }
    }

    pub fn with_fallback_sigma(mut self, sigma: f64) -> Self {
        self.fallback_sigma = Some(sigma);
        self
    }
}

/// Anomaly detection and severity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub success_rate: MetricThresholds,
    pub avg_duration: MetricThresholds,
    pub avg_records_processed: MetricThresholds,
    /// Extra σ beyond the trigger threshold per severity step
    pub high_delta: f64,
    /// Fewer eligible peers than this skips the metric
    pub min_peer_population: usize,
    /// Pipelines with fewer runs are left out of the peer set
    pub min_executions: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            success_rate: MetricThresholds::new(1.0).with_fallback_sigma(0.05),
            avg_duration: MetricThresholds::new(2.0),
            avg_records_processed: MetricThresholds::new(2.0),
            high_delta: 1.0,
            min_peer_population: 2,
            min_executions: 1,
        }
    }
}

impl DetectionConfig {
    pub fn thresholds(&self, metric: Metric) -> MetricThresholds {
        match metric {
            Metric::SuccessRate => self.success_rate,
            Metric::AvgDuration => self.avg_duration,
            Metric::AvgRecordsProcessed => self.avg_records_processed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for metric in Metric::ALL {
            let t = self.thresholds(metric);
            if !(t.sigma_multiplier.is_finite() && t.sigma_multiplier > 0.0) {
                return Err(MonitorError::InvalidConfig(format!(
                    "{}.sigma_multiplier must be a positive number",
                    metric
                )));
            }
            if let Some(sigma) = t.fallback_sigma {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(MonitorError::InvalidConfig(format!(
                        "{}.fallback_sigma must be a positive number",
                        metric
                    )));
                }
            }
        }
        if !(self.high_delta.is_finite() && self.high_delta > 0.0) {
            return Err(MonitorError::InvalidConfig(
                "high_delta must be a positive number".to_string(),
            ));
        }
        if self.min_peer_population == 0 {
            return Err(MonitorError::InvalidConfig(
                "min_peer_population must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detection: DetectionConfig,
    /// Number of store partitions
    pub shard_count: usize,
    /// Bound on remembered execution ids per pipeline (unbounded if unset)
    pub dedup_capacity: Option<usize>,
    /// Recent runs kept per pipeline for trend queries (disabled if unset)
    pub history_capacity: Option<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            shard_count: DEFAULT_SHARD_COUNT,
            dedup_capacity: None,
            history_capacity: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        if self.shard_count == 0 {
            return Err(MonitorError::InvalidConfig(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if self.dedup_capacity == Some(0) {
            return Err(MonitorError::InvalidConfig(
                "dedup_capacity must be at least 1 when set".to_string(),
            ));
        }
        if self.history_capacity == Some(0) {
            return Err(MonitorError::InvalidConfig(
                "history_capacity must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        let detection = &config.detection;
        assert_eq!(detection.success_rate.sigma_multiplier, 1.0);
        assert_eq!(detection.success_rate.fallback_sigma, Some(0.05));
        assert_eq!(detection.avg_duration.sigma_multiplier, 2.0);
        assert_eq!(detection.avg_duration.fallback_sigma, None);
        assert_eq!(detection.avg_records_processed.sigma_multiplier, 2.0);
        assert_eq!(detection.high_delta, 1.0);
        assert_eq!(detection.min_peer_population, 2);
        assert_eq!(config.shard_count, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"detection": {"high_delta": 0.5}, "history_capacity": 100}"#)
                .unwrap();
        assert_eq!(config.detection.high_delta, 0.5);
        assert_eq!(config.detection.success_rate.sigma_multiplier, 1.0);
        assert_eq!(config.history_capacity, Some(100));
        assert_eq!(config.shard_count, 16);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = MonitorConfig::default();
        config.detection.avg_duration.sigma_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.shard_count = 0;
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));

        let mut config = MonitorConfig::default();
        config.detection.success_rate.fallback_sigma = Some(-1.0);
        assert!(config.validate().is_err());
    }
}
