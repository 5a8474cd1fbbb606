//! Peer-based outlier detection
//!
//! Compares every pipeline against the population of its peers, one metric
//! at a time, using the population mean and standard deviation of a single
//! consistent snapshot.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DetectionConfig;
use crate::models::{Direction, Metric};
use crate::store::PipelineHealth;

/// Relative tolerance under which a peer standard deviation counts as zero
const ZERO_SIGMA_TOLERANCE: f64 = 1e-12;

/// Population statistics for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerStats {
    pub mean: f64,
    /// Population (not sample) standard deviation
    pub std_dev: f64,
    pub population: usize,
}

impl PeerStats {
    /// Two-pass mean and population standard deviation
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            population: values.len(),
        })
    }

    /// True when every peer holds (numerically) the same value
    pub fn is_degenerate(&self) -> bool {
        self.std_dev <= ZERO_SIGMA_TOLERANCE * self.mean.abs().max(1.0)
    }
}

/// A pipeline whose metric crossed its peer threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    pub pipeline_id: String,
    pub team: String,
    pub metric: Metric,
    pub observed: f64,
    pub peer_mean: f64,
    /// σ used for the threshold (the fallback when the peers had none)
    pub peer_stdev: f64,
    /// Trigger multiple k for this metric
    pub sigma_multiplier: f64,
    pub threshold: f64,
    pub fallback_sigma_used: bool,
}

/// Flags pipelines that are outliers relative to their peers
pub struct AnomalyDetector {
    config: DetectionConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run every metric over `snapshot`.
    ///
    /// Crossings come out metric by metric and, within a metric, sorted by
    /// pipeline id, so equal snapshots always give equal output.
    pub fn detect(&self, snapshot: &[PipelineHealth]) -> Vec<Crossing> {
        Metric::ALL
            .iter()
            .flat_map(|metric| self.detect_metric(*metric, snapshot))
            .collect()
    }

    /// Detect crossings for a single metric
    pub fn detect_metric(&self, metric: Metric, snapshot: &[PipelineHealth]) -> Vec<Crossing> {
        let mut peers: Vec<(&PipelineHealth, f64)> = snapshot
            .iter()
            .filter(|p| self.is_eligible(p))
            .filter_map(|p| metric_value(p, metric).map(|v| (p, v)))
            .collect();

        if peers.len() < self.config.min_peer_population {
            debug!(
                metric = %metric,
                peers = peers.len(),
                required = self.config.min_peer_population,
                "Skipping metric, peer population too small"
            );
            return Vec::new();
        }

        peers.sort_by(|a, b| a.0.pipeline_id.cmp(&b.0.pipeline_id));

        let values: Vec<f64> = peers.iter().map(|(_, v)| *v).collect();
        let Some(stats) = PeerStats::from_values(&values) else {
            return Vec::new();
        };

        let thresholds = self.config.thresholds(metric);
        let (sigma, fallback_sigma_used) = if stats.is_degenerate() {
            match thresholds.fallback_sigma {
                Some(fallback) => (fallback, true),
                None => {
                    debug!(metric = %metric, "Skipping metric, peers have zero variance");
                    return Vec::new();
                }
            }
        } else {
            (stats.std_dev, false)
        };

        let k = thresholds.sigma_multiplier;
        let direction = metric.bad_direction();
        let threshold = match direction {
            Direction::Low => stats.mean - k * sigma,
            Direction::High => stats.mean + k * sigma,
        };

        peers
            .into_iter()
            .filter(|(_, value)| match direction {
                Direction::Low => *value < threshold,
                Direction::High => *value > threshold,
            })
            .map(|(p, value)| Crossing {
                pipeline_id: p.pipeline_id.clone(),
                team: p.team.clone(),
                metric,
                observed: value,
                peer_mean: stats.mean,
                peer_stdev: sigma,
                sigma_multiplier: k,
                threshold,
                fallback_sigma_used,
            })
            .collect()
    }

    fn is_eligible(&self, pipeline: &PipelineHealth) -> bool {
        pipeline.has_data() && pipeline.total_count >= self.config.min_executions
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

/// Metric value of a pipeline, `None` when it has no data
pub fn metric_value(pipeline: &PipelineHealth, metric: Metric) -> Option<f64> {
    if !pipeline.has_data() {
        return None;
    }
    match metric {
        Metric::SuccessRate => pipeline.success_rate(),
        Metric::AvgDuration => Some(pipeline.avg_duration_secs),
        Metric::AvgRecordsProcessed => Some(pipeline.avg_records_processed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(id: &str, total: u64, success: u64, duration: f64, records: f64) -> PipelineHealth {
        PipelineHealth {
            pipeline_id: id.to_string(),
            team: format!("team-{}", id),
            total_count: total,
            success_count: success,
            failed_count: total - success,
            avg_duration_secs: duration,
            avg_records_processed: records,
            last_execution_time: None,
        }
    }

    #[test]
    fn test_peer_stats_population_std_dev() {
        let stats = PeerStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert_eq!(stats.population, 8);
        assert!(PeerStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_success_rate_outlier_flagged() {
        // Rates 0.95, 0.96, 0.40
        let snapshot = vec![
            pipeline("a", 100, 95, 10.0, 100.0),
            pipeline("b", 100, 96, 10.0, 100.0),
            pipeline("c", 100, 40, 10.0, 100.0),
        ];
        let detector = AnomalyDetector::default();

        let crossings = detector.detect(&snapshot);
        assert_eq!(crossings.len(), 1);
        let c = &crossings[0];
        assert_eq!(c.pipeline_id, "c");
        assert_eq!(c.metric, Metric::SuccessRate);
        assert!((c.peer_mean - 0.77).abs() < 1e-9);
        assert!(c.threshold > 0.40 && c.threshold < 0.95);
        assert!(!c.fallback_sigma_used);
    }

    #[test]
    fn test_identical_population_not_flagged_with_fallback() {
        let snapshot = vec![
            pipeline("a", 10, 10, 30.0, 500.0),
            pipeline("b", 20, 20, 30.0, 500.0),
            pipeline("c", 5, 5, 30.0, 500.0),
        ];
        let detector = AnomalyDetector::default();
        assert!(detector.detect(&snapshot).is_empty());
    }

    #[test]
    fn test_identical_inexact_floats_not_flagged() {
        // 0.1 is not exactly representable; the mean may drift by an ulp
        let snapshot: Vec<_> = (0..7)
            .map(|i| pipeline(&format!("p{}", i), 10, 1, 0.1, 0.1))
            .collect();
        let detector = AnomalyDetector::default();
        assert!(detector.detect(&snapshot).is_empty());
    }

    #[test]
    fn test_single_outlier_with_identical_peers_uses_real_sigma() {
        let snapshot = vec![
            pipeline("a", 10, 10, 30.0, 500.0),
            pipeline("b", 10, 10, 30.0, 500.0),
            pipeline("c", 10, 5, 30.0, 500.0),
        ];
        let crossings = AnomalyDetector::default().detect_metric(Metric::SuccessRate, &snapshot);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].pipeline_id, "c");
        assert!(!crossings[0].fallback_sigma_used);
    }

    #[test]
    fn test_duration_high_outlier() {
        let mut snapshot: Vec<_> = (0..9)
            .map(|i| pipeline(&format!("p{}", i), 10, 10, 60.0 + i as f64, 1000.0))
            .collect();
        snapshot.push(pipeline("slow", 10, 10, 600.0, 1000.0));

        let crossings = AnomalyDetector::default().detect(&snapshot);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].pipeline_id, "slow");
        assert_eq!(crossings[0].metric, Metric::AvgDuration);
        assert!(crossings[0].observed > crossings[0].threshold);
    }

    #[test]
    fn test_records_low_outlier() {
        let mut snapshot: Vec<_> = (0..9)
            .map(|i| pipeline(&format!("p{}", i), 10, 10, 60.0, 10_000.0 + i as f64 * 10.0))
            .collect();
        snapshot.push(pipeline("starved", 10, 10, 60.0, 10.0));

        let crossings = AnomalyDetector::default().detect(&snapshot);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].pipeline_id, "starved");
        assert_eq!(crossings[0].metric, Metric::AvgRecordsProcessed);
    }

    #[test]
    fn test_zero_variance_without_fallback_skips() {
        let snapshot = vec![
            pipeline("a", 10, 10, 30.0, 500.0),
            pipeline("b", 10, 10, 30.0, 500.0),
        ];
        let detector = AnomalyDetector::default();
        assert!(detector
            .detect_metric(Metric::AvgDuration, &snapshot)
            .is_empty());
    }

    #[test]
    fn test_configured_duration_fallback_on_identical_peers() {
        let mut config = DetectionConfig::default();
        config.avg_duration.fallback_sigma = Some(1.0);
        let detector = AnomalyDetector::new(config);

        let snapshot = vec![
            pipeline("a", 10, 10, 30.0, 500.0),
            pipeline("b", 10, 10, 30.0, 500.0),
        ];
        // Identical peers: the fallback applies but nobody is off the mean
        assert!(detector.detect_metric(Metric::AvgDuration, &snapshot).is_empty());
    }

    #[test]
    fn test_insufficient_population_skips() {
        let snapshot = vec![pipeline("lonely", 10, 0, 999.0, 0.0)];
        assert!(AnomalyDetector::default().detect(&snapshot).is_empty());
    }

    #[test]
    fn test_zero_sample_and_low_volume_pipelines_excluded() {
        let mut config = DetectionConfig::default();
        config.min_executions = 5;
        let detector = AnomalyDetector::new(config);

        let snapshot = vec![
            pipeline("a", 10, 10, 30.0, 500.0),
            pipeline("b", 10, 9, 30.0, 500.0),
            pipeline("new", 2, 0, 30.0, 500.0),
            pipeline("empty", 0, 0, 0.0, 0.0),
        ];
        let crossings = detector.detect_metric(Metric::SuccessRate, &snapshot);
        assert!(crossings.iter().all(|c| c.pipeline_id != "new"));
        assert!(crossings.iter().all(|c| c.pipeline_id != "empty"));
    }

    #[test]
    fn test_output_order_is_deterministic() {
        let snapshot_a = vec![
            pipeline("z", 10, 1, 500.0, 1.0),
            pipeline("a", 10, 10, 10.0, 1000.0),
            pipeline("m", 10, 10, 10.0, 1000.0),
            pipeline("b", 10, 1, 500.0, 1.0),
            pipeline("c", 10, 10, 10.0, 1000.0),
            pipeline("d", 10, 10, 10.0, 1000.0),
        ];
        let mut snapshot_b = snapshot_a.clone();
        snapshot_b.reverse();

        let detector = AnomalyDetector::default();
        assert_eq!(detector.detect(&snapshot_a), detector.detect(&snapshot_b));
    }
}
