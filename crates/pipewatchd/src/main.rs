//! pipewatchd - pipeline health monitoring daemon
//!
//! Aggregates pipeline execution events, flags pipelines that fall out of
//! line with their peers and routes the resulting alerts by team.

use std::sync::Arc;

use anyhow::{Context, Result};
use pipewatch_lib::{
    ingest, DetectionLoopBuilder, LogSink, PipelineMonitor, StructuredLogger,
};
use pipewatchd::{api, config::DaemonConfig};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pipewatchd");

    let config = DaemonConfig::load()?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        detection_interval_secs = config.detection_interval_secs,
        "Daemon configured"
    );

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(DAEMON_VERSION);

    let monitor = Arc::new(
        PipelineMonitor::new(config.monitor.clone()).context("Failed to build monitor")?,
    );

    let detection = DetectionLoopBuilder::new()
        .monitor(monitor.clone())
        .sink(Arc::new(LogSink::new(StructuredLogger::new(&config.instance))))
        .interval(config.detection_interval())
        .suppression_window(config.suppression_window())
        .build()?;

    let app_state = Arc::new(api::AppState::new(monitor.clone(), detection.status()));

    // Serve probes while the initial load runs so /readyz can report progress
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    if let Some(path) = &config.events_path {
        let report = ingest::load_jsonl(path, &monitor).await?;
        if !report.rejected.is_empty() {
            warn!(
                rejected = report.rejected.len(),
                path = %path.display(),
                "Some execution events were rejected"
            );
        }
    }
    app_state.set_ready(true);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let detection_handle = tokio::spawn(detection.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = detection_handle.await {
        warn!(error = %e, "Detection loop did not stop cleanly");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
