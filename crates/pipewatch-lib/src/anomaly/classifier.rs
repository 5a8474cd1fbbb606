//! Severity classification for threshold crossings

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Crossing;
use crate::models::Metric;

/// Alert severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 3] = [
        AlertSeverity::Medium,
        AlertSeverity::High,
        AlertSeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified anomaly, produced once per detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub pipeline_id: String,
    pub team: String,
    pub metric: Metric,
    pub observed: f64,
    pub peer_mean: f64,
    /// σ the crossing was judged against
    pub peer_stdev: f64,
    pub threshold: f64,
    /// Distance from the peer mean in σ units
    pub deviation: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}

/// Render the alert text.
///
/// Depends only on its arguments, with fixed precision, so equal inputs
/// always produce the same string (the router keys on it).
pub fn render_message(pipeline_id: &str, metric: Metric, observed: f64, peer_mean: f64) -> String {
    match metric {
        Metric::SuccessRate => format!(
            "{}: success rate {:.1}% is below peer mean {:.1}%",
            pipeline_id,
            observed * 100.0,
            peer_mean * 100.0
        ),
        Metric::AvgDuration => format!(
            "{}: average duration {:.1}s is above peer mean {:.1}s",
            pipeline_id, observed, peer_mean
        ),
        Metric::AvgRecordsProcessed => format!(
            "{}: average records processed {:.1} is below peer mean {:.1}",
            pipeline_id, observed, peer_mean
        ),
    }
}

/// Turns crossings into severity-levelled alerts
#[derive(Debug, Clone)]
pub struct AlertClassifier {
    /// σ units per severity step beyond the trigger threshold
    high_delta: f64,
}

impl AlertClassifier {
    pub fn new(high_delta: f64) -> Self {
        Self { high_delta }
    }

    /// Severity for a deviation `d` (in σ units) past trigger multiple `k`
    pub fn severity_for(&self, deviation: f64, sigma_multiplier: f64) -> AlertSeverity {
        if deviation > sigma_multiplier + 2.0 * self.high_delta {
            AlertSeverity::Critical
        } else if deviation > sigma_multiplier + self.high_delta {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        }
    }

    pub fn classify(&self, crossing: &Crossing, detected_at: DateTime<Utc>) -> Alert {
        let deviation = (crossing.observed - crossing.peer_mean).abs() / crossing.peer_stdev;
        let severity = self.severity_for(deviation, crossing.sigma_multiplier);

        Alert {
            pipeline_id: crossing.pipeline_id.clone(),
            team: crossing.team.clone(),
            metric: crossing.metric,
            observed: crossing.observed,
            peer_mean: crossing.peer_mean,
            peer_stdev: crossing.peer_stdev,
            threshold: crossing.threshold,
            deviation,
            severity,
            message: render_message(
                &crossing.pipeline_id,
                crossing.metric,
                crossing.observed,
                crossing.peer_mean,
            ),
            detected_at,
        }
    }

    /// Classify a whole detection pass, keeping its order
    pub fn classify_all(&self, crossings: &[Crossing], detected_at: DateTime<Utc>) -> Vec<Alert> {
        crossings
            .iter()
            .map(|c| self.classify(c, detected_at))
            .collect()
    }
}

impl Default for AlertClassifier {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duration_crossing(observed: f64) -> Crossing {
        Crossing {
            pipeline_id: "orders".to_string(),
            team: "data-eng".to_string(),
            metric: Metric::AvgDuration,
            observed,
            peer_mean: 100.0,
            peer_stdev: 10.0,
            sigma_multiplier: 2.0,
            threshold: 120.0,
            fallback_sigma_used: false,
        }
    }

    #[test]
    fn test_severity_bands() {
        let classifier = AlertClassifier::default();
        let now = Utc::now();

        // k = 2, HIGH_DELTA = 1: MEDIUM up to 3σ, HIGH up to 4σ
        assert_eq!(
            classifier.classify(&duration_crossing(125.0), now).severity,
            AlertSeverity::Medium
        );
        assert_eq!(
            classifier.classify(&duration_crossing(130.0), now).severity,
            AlertSeverity::Medium
        );
        assert_eq!(
            classifier.classify(&duration_crossing(135.0), now).severity,
            AlertSeverity::High
        );
        assert_eq!(
            classifier.classify(&duration_crossing(140.0), now).severity,
            AlertSeverity::High
        );
        assert_eq!(
            classifier.classify(&duration_crossing(141.0), now).severity,
            AlertSeverity::Critical
        );
    }

    #[test]
    fn test_severity_is_monotonic() {
        let classifier = AlertClassifier::default();
        let now = Utc::now();
        // HIGH boundary sits at μ + (k + HIGH_DELTA)σ = 130
        let boundary = 130.0;

        let mut last = AlertSeverity::Medium;
        for past in [0.0, 0.10, 0.50, 3.0] {
            let observed = boundary * (1.0 + past);
            let severity = classifier.classify(&duration_crossing(observed), now).severity;
            assert!(severity >= last, "{} dropped to {:?}", observed, severity);
            last = severity;
        }
        assert_eq!(last, AlertSeverity::Critical);

        let mut last = AlertSeverity::Medium;
        for step in 0..500 {
            let observed = 120.5 + step as f64 * 0.25;
            let severity = classifier.classify(&duration_crossing(observed), now).severity;
            assert!(severity >= last);
            last = severity;
        }
    }

    #[test]
    fn test_deviation_recorded() {
        let alert = AlertClassifier::default().classify(&duration_crossing(150.0), Utc::now());
        assert!((alert.deviation - 5.0).abs() < 1e-12);
        assert_eq!(alert.threshold, 120.0);
        assert_eq!(alert.team, "data-eng");
    }

    #[test]
    fn test_message_is_deterministic() {
        let a = render_message("orders", Metric::SuccessRate, 0.4, 0.77);
        let b = render_message("orders", Metric::SuccessRate, 0.4, 0.77);
        assert_eq!(a, b);
        assert_eq!(a, "orders: success rate 40.0% is below peer mean 77.0%");

        let early = AlertClassifier::default().classify(&duration_crossing(150.0), Utc::now());
        let later = AlertClassifier::default()
            .classify(&duration_crossing(150.0), Utc::now() + chrono::Duration::hours(1));
        assert_eq!(early.message, later.message);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
        assert_eq!(
            serde_json::to_string(&AlertSeverity::Critical).unwrap(),
            "\"CRITICAL\""
        );
    }
}
