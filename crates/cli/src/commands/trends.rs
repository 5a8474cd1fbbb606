//! Performance trend command

use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::Colorize;
use pipewatch_lib::PipelineMonitor;

use crate::output::{
    color_rate, format_count, format_duration, print_heading, print_json, OutputFormat,
};

/// Show run statistics for one pipeline over the trailing `days`
pub fn show_trend(
    monitor: &PipelineMonitor,
    pipeline_id: &str,
    days: u32,
    format: OutputFormat,
) -> Result<()> {
    if days == 0 {
        bail!("--days must be at least 1");
    }

    let trend = monitor
        .trend(pipeline_id, days, Utc::now())
        .with_context(|| format!("Cannot compute trend for pipeline '{}'", pipeline_id))?;

    match format {
        OutputFormat::Json => print_json(&trend)?,
        OutputFormat::Table => {
            print_heading(&format!("Trend for {} (last {} days)", pipeline_id.cyan(), days));
            println!("Runs:                   {}", trend.total_count);
            println!("Success Rate:           {}", color_rate(Some(trend.success_rate)));
            println!("Avg Duration:           {}", format_duration(trend.avg_duration_secs));
            println!(
                "Duration Range:         {} - {}",
                format_duration(trend.min_duration_secs),
                format_duration(trend.max_duration_secs)
            );
            println!(
                "Avg Records:            {}",
                format_count(trend.avg_records_processed)
            );
        }
    }

    Ok(())
}
