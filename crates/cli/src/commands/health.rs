//! Health report commands

use anyhow::{Context, Result};
use colored::Colorize;
use pipewatch_lib::{PipelineHealth, PipelineMonitor, TeamHealth};
use tabled::Tabled;

use crate::output::{
    color_rate, format_count, format_duration, format_optional_duration,
    format_timestamp, print_heading, print_json, print_table, OutputFormat,
};

/// Row for the pipeline health table
#[derive(Tabled)]
struct PipelineRow {
    #[tabled(rename = "Pipeline")]
    pipeline_id: String,
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Runs")]
    total: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Success")]
    success_rate: String,
    #[tabled(rename = "Avg Duration")]
    avg_duration: String,
    #[tabled(rename = "Avg Records")]
    avg_records: String,
    #[tabled(rename = "Last Run")]
    last_run: String,
}

impl From<&PipelineHealth> for PipelineRow {
    fn from(p: &PipelineHealth) -> Self {
        Self {
            pipeline_id: p.pipeline_id.clone(),
            team: p.team.clone(),
            total: p.total_count,
            failed: p.failed_count,
            success_rate: color_rate(p.success_rate()),
            avg_duration: format_duration(p.avg_duration_secs),
            avg_records: format_count(p.avg_records_processed),
            last_run: format_timestamp(p.last_execution_time),
        }
    }
}

/// Row for the team health table
#[derive(Tabled)]
struct TeamRow {
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Pipelines")]
    pipelines: usize,
    #[tabled(rename = "Runs")]
    total: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Success")]
    success_rate: String,
    #[tabled(rename = "Avg Duration")]
    avg_duration: String,
}

impl From<&TeamHealth> for TeamRow {
    fn from(t: &TeamHealth) -> Self {
        Self {
            team: t.team.clone(),
            pipelines: t.pipeline_count,
            total: t.total_count,
            failed: t.failed_count,
            success_rate: color_rate(t.success_rate),
            avg_duration: format_optional_duration(t.avg_duration_secs),
        }
    }
}

/// Show one pipeline, or every pipeline sorted by id
pub fn show_health(
    monitor: &PipelineMonitor,
    pipeline_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let pipelines = match &pipeline_id {
        Some(id) => vec![monitor
            .pipeline_health(id)
            .with_context(|| format!("No health data for pipeline '{}'", id))?],
        None => {
            let mut all = monitor.all_health().into_vec();
            all.sort_by(|a, b| a.pipeline_id.cmp(&b.pipeline_id));
            all
        }
    };

    match format {
        OutputFormat::Json => match pipeline_id {
            Some(_) => print_json(&pipelines[0])?,
            None => print_json(&pipelines)?,
        },
        OutputFormat::Table => {
            print_heading("Pipeline Health");
            print_table(
                pipelines.iter().map(PipelineRow::from).collect(),
                "No pipelines found",
            );
        }
    }

    Ok(())
}

/// Show one team, or every team
pub fn show_teams(monitor: &PipelineMonitor, team: Option<String>, format: OutputFormat) -> Result<()> {
    let teams = match &team {
        Some(name) => vec![monitor
            .team_health(name)
            .with_context(|| format!("No pipelines found for team '{}'", name))?],
        None => monitor.all_team_health(),
    };

    match format {
        OutputFormat::Json => match team {
            Some(_) => print_json(&teams[0])?,
            None => print_json(&teams)?,
        },
        OutputFormat::Table => {
            print_heading("Team Health");
            print_table(teams.iter().map(TeamRow::from).collect(), "No teams found");
        }
    }

    Ok(())
}

/// Show totals across every pipeline
pub fn show_summary(monitor: &PipelineMonitor, format: OutputFormat) -> Result<()> {
    let summary = monitor.global_summary();

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading("Global Summary");
            println!("Pipelines:              {}", summary.pipeline_count);
            println!("Teams:                  {}", summary.team_count);
            println!("Executions:             {}", summary.total_count);
            println!("Succeeded:              {}", summary.success_count.to_string().green());
            println!("Failed:                 {}", summary.failed_count.to_string().red());
            println!("{} {}", "Success Rate:".bold(), color_rate(summary.success_rate));
        }
    }

    Ok(())
}
