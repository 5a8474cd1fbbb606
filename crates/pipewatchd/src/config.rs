//! Daemon configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pipewatch_lib::MonitorConfig;
use serde::Deserialize;

/// Config file consulted when `PIPEWATCH_CONFIG` is unset
const DEFAULT_CONFIG_FILE: &str = "pipewatch.toml";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// JSONL file of execution events loaded at startup
    #[serde(default)]
    pub events_path: Option<PathBuf>,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Detection interval in seconds
    #[serde(default = "default_detection_interval")]
    pub detection_interval_secs: u64,

    /// Window during which a repeated alert is not dispatched again (0 disables)
    #[serde(default = "default_suppression_window")]
    pub suppression_window_secs: u64,

    /// Aggregation and detection settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "pipewatchd".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_detection_interval() -> u64 {
    60
}

fn default_suppression_window() -> u64 {
    15 * 60
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            events_path: None,
            api_port: default_api_port(),
            detection_interval_secs: default_detection_interval(),
            suppression_window_secs: default_suppression_window(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `PIPEWATCH_CONFIG` (or `pipewatch.toml`) overlaid with the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("PIPEWATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load from `path` if it exists, then apply `PIPEWATCH_*` overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `PIPEWATCH_MONITOR__DETECTION__HIGH_DELTA=0.5`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("PIPEWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid daemon configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection_interval_secs == 0 {
            anyhow::bail!("detection_interval_secs must be at least 1");
        }
        self.monitor
            .validate()
            .context("Invalid monitor configuration")?;
        Ok(())
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_secs(self.detection_interval_secs)
    }

    pub fn suppression_window(&self) -> Option<Duration> {
        match self.suppression_window_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
