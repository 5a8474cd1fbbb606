//! Pipeline health monitoring library
//!
//! This crate provides the core functionality for:
//! - Idempotent aggregation of pipeline execution events
//! - Pipeline, team and global health reports
//! - Peer-based anomaly detection and severity classification
//! - Alert deduplication and routing by team
//! - Observability (metrics and structured logs)

pub mod aggregator;
pub mod anomaly;
pub mod config;
pub mod detection_loop;
pub mod error;
pub mod history;
pub mod ingest;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod reporter;
pub mod sink;
pub mod store;

pub use aggregator::{Aggregator, ApplyOutcome};
pub use anomaly::{Alert, AlertSeverity, Crossing, RoutedAlerts};
pub use config::{DetectionConfig, MetricThresholds, MonitorConfig};
pub use detection_loop::{DetectionLoop, DetectionLoopBuilder, DetectionStatus, RunSummary};
pub use error::{MonitorError, Result};
pub use history::PerformanceTrend;
pub use models::*;
pub use monitor::{DetectionReport, PipelineMonitor};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use reporter::{GlobalSummary, HealthReporter, HealthSnapshot, TeamHealth};
pub use sink::{AlertSink, LogSink};
pub use store::{AggregateStore, PipelineHealth};
