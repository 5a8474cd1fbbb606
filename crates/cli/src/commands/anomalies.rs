//! Anomaly detection command

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use pipewatch_lib::{Alert, Metric, PipelineMonitor};
use tabled::Tabled;

use crate::output::{
    color_severity, format_count, format_duration, format_rate, print_heading, print_json,
    print_success, print_table, OutputFormat,
};

/// Row for the alert table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Pipeline")]
    pipeline_id: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Peer Mean")]
    peer_mean: String,
    #[tabled(rename = "Deviation")]
    deviation: String,
}

/// Render a metric value in its natural unit
fn format_metric_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::SuccessRate => format_rate(Some(value)),
        Metric::AvgDuration => format_duration(value),
        Metric::AvgRecordsProcessed => format_count(value),
    }
}

impl From<&Alert> for AlertRow {
    fn from(a: &Alert) -> Self {
        Self {
            team: a.team.clone(),
            severity: color_severity(a.severity),
            pipeline_id: a.pipeline_id.clone(),
            metric: a.metric.to_string(),
            observed: format_metric_value(a.metric, a.observed),
            peer_mean: format_metric_value(a.metric, a.peer_mean),
            deviation: format!("{:.2}σ", a.deviation),
        }
    }
}

/// Run one detection pass and print alerts grouped by team
pub fn show_anomalies(monitor: &PipelineMonitor, format: OutputFormat) -> Result<()> {
    let report = monitor.detect_and_route(Utc::now());

    match format {
        OutputFormat::Json => print_json(&report.routed)?,
        OutputFormat::Table => {
            if report.routed.is_empty() {
                print_success(&format!(
                    "No anomalies across {} pipelines",
                    report.pipelines
                ));
                return Ok(());
            }

            print_heading("Anomalies");
            print_table(
                report.routed.iter().map(AlertRow::from).collect(),
                "No anomalies found",
            );

            println!();
            for alert in report.routed.iter() {
                println!("  {} {}", "•".dimmed(), alert.message);
            }
        }
    }

    Ok(())
}
