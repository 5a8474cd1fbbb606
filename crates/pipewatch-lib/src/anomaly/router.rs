//! Alert deduplication and team routing
//!
//! Handles:
//! - Dropping duplicate alerts within one detection run
//! - Grouping survivors by team, then severity
//! - Optional suppression of alerts already dispatched in a recent run

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{Alert, AlertSeverity};

/// Default cross-run suppression window (15 minutes)
const DEFAULT_SUPPRESSION_WINDOW_SECS: u64 = 15 * 60;

/// Alerts of one team, bucketed by severity
pub type SeverityBuckets = BTreeMap<AlertSeverity, Vec<Alert>>;

/// Team → severity → alerts, in detection order within each bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RoutedAlerts {
    teams: BTreeMap<String, SeverityBuckets>,
}

impl RoutedAlerts {
    /// Teams with at least one alert, sorted
    pub fn teams(&self) -> impl Iterator<Item = &str> {
        self.teams.keys().map(String::as_str)
    }

    pub fn team(&self, team: &str) -> Option<&SeverityBuckets> {
        self.teams.get(team)
    }

    /// Alerts for one (team, severity) bucket
    pub fn alerts(&self, team: &str, severity: AlertSeverity) -> &[Alert] {
        self.teams
            .get(team)
            .and_then(|buckets| buckets.get(&severity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every alert, team by team, most severe bucket first
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.teams
            .values()
            .flat_map(|buckets| buckets.values().rev().flatten())
    }

    pub fn len(&self) -> usize {
        self.teams
            .values()
            .flat_map(|buckets| buckets.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn count_by_severity(&self) -> BTreeMap<AlertSeverity, usize> {
        let mut counts = BTreeMap::new();
        for buckets in self.teams.values() {
            for (severity, alerts) in buckets {
                *counts.entry(*severity).or_insert(0) += alerts.len();
            }
        }
        counts
    }

    /// Keep only alerts matching `keep`, pruning emptied buckets and teams
    pub fn retain(&mut self, mut keep: impl FnMut(&Alert) -> bool) {
        for buckets in self.teams.values_mut() {
            for alerts in buckets.values_mut() {
                alerts.retain(|a| keep(a));
            }
            buckets.retain(|_, alerts| !alerts.is_empty());
        }
        self.teams.retain(|_, buckets| !buckets.is_empty());
    }

    fn push(&mut self, alert: Alert) {
        self.teams
            .entry(alert.team.clone())
            .or_default()
            .entry(alert.severity)
            .or_default()
            .push(alert);
    }
}

/// Key under which two alerts count as the same
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    pipeline_id: String,
    message: String,
}

impl DedupKey {
    fn of(alert: &Alert) -> Self {
        Self {
            pipeline_id: alert.pipeline_id.clone(),
            message: alert.message.clone(),
        }
    }
}

/// Collapses duplicates within a run and groups the survivors
#[derive(Debug, Clone, Default)]
pub struct AlertRouter;

impl AlertRouter {
    pub fn new() -> Self {
        Self
    }

    /// Keep the first alert per (pipeline_id, message), in input order
    pub fn dedup(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        let mut seen = HashSet::new();
        alerts
            .into_iter()
            .filter(|alert| seen.insert(DedupKey::of(alert)))
            .collect()
    }

    /// Deduplicate then group by team and severity
    pub fn route(&self, alerts: Vec<Alert>) -> RoutedAlerts {
        let mut routed = RoutedAlerts::default();
        for alert in self.dedup(alerts) {
            routed.push(alert);
        }
        routed
    }
}

/// Suppresses alerts already dispatched within a time window
pub struct SuppressionCache {
    window: Duration,
    /// Key -> last dispatch time
    recent: RwLock<HashMap<DedupKey, Instant>>,
}

impl SuppressionCache {
    /// Create a cache with the default 15-minute window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(DEFAULT_SUPPRESSION_WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            recent: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop alerts dispatched inside the window.
    ///
    /// Read-only with respect to the window: survivors are only remembered
    /// once [`record`](Self::record) is called for them. Returns the number
    /// of suppressed alerts.
    pub fn filter(&self, routed: &mut RoutedAlerts) -> usize {
        let now = Instant::now();
        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        recent.retain(|_, at| now.duration_since(*at) < self.window);

        let before = routed.len();
        routed.retain(|alert| !recent.contains_key(&DedupKey::of(alert)));
        before - routed.len()
    }

    /// Remember every alert in `routed` as dispatched now
    pub fn record(&self, routed: &RoutedAlerts) {
        let now = Instant::now();
        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        for alert in routed.iter() {
            recent.insert(DedupKey::of(alert), now);
        }
    }

    /// Number of keys currently remembered
    pub fn len(&self) -> usize {
        self.recent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SuppressionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::render_message;
    use crate::models::Metric;
    use chrono::Utc;
    use std::thread::sleep;

    fn alert(pipeline: &str, team: &str, severity: AlertSeverity, observed: f64) -> Alert {
        Alert {
            pipeline_id: pipeline.to_string(),
            team: team.to_string(),
            metric: Metric::AvgDuration,
            observed,
            peer_mean: 100.0,
            peer_stdev: 10.0,
            threshold: 120.0,
            deviation: (observed - 100.0) / 10.0,
            severity,
            message: render_message(pipeline, Metric::AvgDuration, observed, 100.0),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let router = AlertRouter::new();
        let first = alert("orders", "data-eng", AlertSeverity::Medium, 125.0);
        let mut dup = first.clone();
        dup.severity = AlertSeverity::Critical;

        let routed = router.route(vec![first.clone(), dup]);
        assert_eq!(routed.len(), 1);
        assert_eq!(
            routed.alerts("data-eng", AlertSeverity::Medium),
            &[first][..]
        );
        assert!(routed.alerts("data-eng", AlertSeverity::Critical).is_empty());
    }

    #[test]
    fn test_same_message_other_pipeline_kept() {
        let router = AlertRouter::new();
        let mut a = alert("orders", "data-eng", AlertSeverity::Medium, 125.0);
        let mut b = alert("billing", "data-eng", AlertSeverity::Medium, 125.0);
        a.message = "same".to_string();
        b.message = "same".to_string();
        assert_eq!(router.dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_grouping_preserves_detection_order() {
        let router = AlertRouter::new();
        let alerts = vec![
            alert("p1", "beta", AlertSeverity::High, 135.0),
            alert("p2", "alpha", AlertSeverity::Medium, 125.0),
            alert("p3", "beta", AlertSeverity::High, 136.0),
            alert("p4", "beta", AlertSeverity::Critical, 150.0),
            alert("p5", "beta", AlertSeverity::High, 137.0),
        ];

        let routed = router.route(alerts);
        assert_eq!(routed.teams().collect::<Vec<_>>(), vec!["alpha", "beta"]);

        let beta_high: Vec<_> = routed
            .alerts("beta", AlertSeverity::High)
            .iter()
            .map(|a| a.pipeline_id.as_str())
            .collect();
        assert_eq!(beta_high, vec!["p1", "p3", "p5"]);

        let order: Vec<_> = routed.iter().map(|a| a.pipeline_id.as_str()).collect();
        assert_eq!(order, vec!["p2", "p4", "p1", "p3", "p5"]);

        let counts = routed.count_by_severity();
        assert_eq!(counts[&AlertSeverity::High], 3);
        assert_eq!(counts[&AlertSeverity::Critical], 1);
        assert_eq!(counts[&AlertSeverity::Medium], 1);
    }

    #[test]
    fn test_routed_json_shape() {
        let routed = AlertRouter::new().route(vec![alert(
            "orders",
            "data-eng",
            AlertSeverity::High,
            135.0,
        )]);
        let json = serde_json::to_value(&routed).unwrap();
        assert_eq!(json["data-eng"]["HIGH"][0]["pipeline_id"], "orders");
    }

    #[test]
    fn test_suppression_window() {
        let cache = SuppressionCache::with_window(Duration::from_millis(100));
        let router = AlertRouter::new();
        let make = || router.route(vec![alert("orders", "data-eng", AlertSeverity::High, 135.0)]);

        let mut first = make();
        assert_eq!(cache.filter(&mut first), 0);
        assert_eq!(first.len(), 1);
        cache.record(&first);

        let mut second = make();
        assert_eq!(cache.filter(&mut second), 1);
        assert!(second.is_empty());

        sleep(Duration::from_millis(150));

        let mut third = make();
        assert_eq!(cache.filter(&mut third), 0);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_unrecorded_alerts_are_not_suppressed() {
        let cache = SuppressionCache::new();
        let router = AlertRouter::new();
        let make = || router.route(vec![alert("orders", "data-eng", AlertSeverity::High, 135.0)]);

        // Filtered but never recorded, as when delivery fails
        let mut first = make();
        assert_eq!(cache.filter(&mut first), 0);
        assert!(cache.is_empty());

        let mut retry = make();
        assert_eq!(cache.filter(&mut retry), 0);
        assert_eq!(retry.len(), 1);

        cache.record(&retry);
        assert_eq!(cache.len(), 1);
        let mut repeat = make();
        assert_eq!(cache.filter(&mut repeat), 1);
    }
}
