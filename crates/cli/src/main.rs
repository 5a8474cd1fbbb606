//! Pipeline health monitor CLI
//!
//! Loads a JSON-lines file of execution events and answers health, anomaly
//! and trend questions about it offline.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, health, trends};
use pipewatch_lib::{ingest, PipelineMonitor};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Pipeline health monitor CLI
#[derive(Parser)]
#[command(name = "pipewatch")]
#[command(author, version, about = "CLI for Pipeline Health Monitor", long_about = None)]
pub struct Cli {
    /// JSON-lines file of execution events (can also be set via PIPEWATCH_DATA_FILE)
    #[arg(long, env = "PIPEWATCH_DATA_FILE")]
    pub data_file: PathBuf,

    /// Path to a JSON config file (default: ~/.config/pipewatch/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show pipeline health
    Health {
        /// Show a single pipeline
        #[arg(long, short)]
        pipeline_id: Option<String>,
    },

    /// Show health aggregated by team
    Teams {
        /// Show a single team
        #[arg(long, short)]
        team: Option<String>,
    },

    /// Detect pipelines that deviate from their peers
    Anomalies,

    /// Show recent performance for a pipeline
    Trends {
        /// Pipeline to analyze
        #[arg(long, short)]
        pipeline_id: String,

        /// Number of trailing days to include
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Show totals across all pipelines
    Summary,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::Config::load(cli.config.as_deref())?;
    let needs_history = matches!(cli.command, Commands::Trends { .. });
    let monitor = PipelineMonitor::new(config.monitor_config(needs_history))?;

    let report = ingest::load_jsonl(&cli.data_file, &monitor).await?;
    if !report.rejected.is_empty() {
        output::print_warning(&format!(
            "Skipped {} of {} lines in {}",
            report.rejected.len(),
            report.lines_read(),
            cli.data_file.display()
        ));
        for rejected in &report.rejected {
            debug!(line = rejected.line, reason = %rejected.reason, "Rejected event line");
        }
    }

    // Execute command
    match cli.command {
        Commands::Health { pipeline_id } => {
            health::show_health(&monitor, pipeline_id, cli.format)?;
        }
        Commands::Teams { team } => {
            health::show_teams(&monitor, team, cli.format)?;
        }
        Commands::Anomalies => {
            anomalies::show_anomalies(&monitor, cli.format)?;
        }
        Commands::Trends { pipeline_id, days } => {
            trends::show_trend(&monitor, &pipeline_id, days, cli.format)?;
        }
        Commands::Summary => {
            health::show_summary(&monitor, cli.format)?;
        }
    }

    Ok(())
}
