//! Runtime configuration: an optional TOML file plus `WORKBOARD_*`
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidOverride { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Write every event to the log
    #[default]
    Log,
    /// In-process broker
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub enabled: bool,
    pub transport: TransportKind,
    pub delivery_timeout_ms: u64,
    /// Pending events kept for the worker; further events are dropped
    pub queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: TransportKind::default(),
            delivery_timeout_ms: 2_000,
            queue_capacity: crate::realtime::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Used when `RUST_LOG` is unset
    pub log_level: String,
    pub query_timeout_ms: u64,
    pub realtime: RealtimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("workboard"),
            log_level: "warn".to_string(),
            query_timeout_ms: 5_000,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Reads `path` when it exists, falls back to defaults otherwise, then
    /// applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Applies `WORKBOARD_*` overrides looked up through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup("WORKBOARD_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("WORKBOARD_LOG") {
            self.log_level = level;
        }
        if let Some(value) = lookup("WORKBOARD_QUERY_TIMEOUT_MS") {
            self.query_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        name: "WORKBOARD_QUERY_TIMEOUT_MS",
                        value,
                    })?;
        }
        if let Some(value) = lookup("WORKBOARD_REALTIME_DISABLED") {
            self.realtime.enabled = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        Ok(self)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime.delivery_timeout_ms)
    }
}
