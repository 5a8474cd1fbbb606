//! Configuration management for the CLI

use anyhow::{Context, Result};
use pipewatch_lib::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runs kept per pipeline when a trend query needs history
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Aggregation and detection settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load from `override_path`, or from the default location if present
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let config_path = match override_path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Monitor settings, with run history switched on when `needs_history`
    pub fn monitor_config(&self, needs_history: bool) -> MonitorConfig {
        let mut monitor = self.monitor.clone();
        if needs_history && monitor.history_capacity.is_none() {
            monitor.history_capacity = Some(DEFAULT_HISTORY_CAPACITY);
        }
        monitor
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("pipewatch").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"monitor": {{"detection": {{"high_delta": 2.0}}, "history_capacity": 50}}}}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.monitor.detection.high_delta, 2.0);
        assert_eq!(config.monitor.history_capacity, Some(50));
        assert_eq!(config.monitor_config(true).history_capacity, Some(50));
    }

    #[test]
    fn test_missing_override_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/config.json"))).is_err());
    }

    #[test]
    fn test_history_enabled_only_when_needed() {
        let config = Config::default();
        assert_eq!(config.monitor_config(false).history_capacity, None);
        assert_eq!(
            config.monitor_config(true).history_capacity,
            Some(DEFAULT_HISTORY_CAPACITY)
        );
    }
}
