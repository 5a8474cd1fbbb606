//! Anomaly detection over pipeline aggregates
//!
//! This module provides:
//! - Peer-population outlier detection per metric
//! - Severity classification of threshold crossings
//! - Deduplication and team/severity routing of alerts

mod classifier;
mod detector;
mod router;

pub use classifier::{render_message, Alert, AlertClassifier, AlertSeverity};
pub use detector::{metric_value, AnomalyDetector, Crossing, PeerStats};
pub use router::{AlertRouter, RoutedAlerts, SeverityBuckets, SuppressionCache};
