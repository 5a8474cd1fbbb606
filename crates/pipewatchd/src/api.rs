//! HTTP API for health checks and Prometheus metrics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use pipewatch_lib::{DetectionStatus, PipelineMonitor, RunSummary};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::{info, warn};

/// Overall daemon status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Healthy,
    /// Still operational, but the last run's alerts were not delivered
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: DaemonStatus,
    pub pipelines_tracked: usize,
    pub uptime_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detection: Option<RunSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared application state
pub struct AppState {
    pub monitor: Arc<PipelineMonitor>,
    pub detection: DetectionStatus,
    started_at: DateTime<Utc>,
    ready: AtomicBool,
}

impl AppState {
    pub fn new(monitor: Arc<PipelineMonitor>, detection: DetectionStatus) -> Self {
        Self {
            monitor,
            detection,
            started_at: Utc::now(),
            ready: AtomicBool::new(false),
        }
    }

    /// Flip readiness once the initial event load has finished
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthResponse {
        let last_detection = self.detection.last_run();
        let status = match &last_detection {
            Some(run) if run.alerts > 0 && !run.dispatched => DaemonStatus::Degraded,
            _ => DaemonStatus::Healthy,
        };

        HealthResponse {
            status,
            pipelines_tracked: self.monitor.store().len(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            last_detection,
        }
    }
}

/// Health check response - always 200 while the process is serving
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health()))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                reason: Some("Initial event load not finished".to_string()),
            }),
        )
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
