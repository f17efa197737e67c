// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dashboard configuration
//!
//! Settings for where runs are fetched from, how often in-progress runs are
//! polled, and the default export shape. Loaded with priority
//! file > environment > defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, RunlensError};

/// Default poll interval for in-progress runs.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Base URL of the results server (e.g., "http://127.0.0.1:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory holding `<session>/<run_name>_<run_id>.json` run files
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Delay between the end of one poll and the start of the next
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Disable to never poll in-progress runs
    #[serde(default = "default_poll_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,

    /// Column names to export; empty = every column
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Serialization target for an export payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = RunlensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(RunlensError::InvalidArgument(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from(".ezvals/sessions")
}

fn default_request_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_enabled() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            results_dir: default_results_dir(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            enabled: default_poll_enabled(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            columns: vec![],
        }
    }
}

impl DashboardConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RunlensError::Config(e.to_string()))
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        Ok(config.merge_with_env(|name| std::env::var(name).ok()))
    }

    /// Apply environment overrides; only variables that are set take effect.
    ///
    /// Supported environment variables:
    /// - RUNLENS_BASE_URL: results server base URL
    /// - RUNLENS_RESULTS_DIR: run file directory
    /// - RUNLENS_POLL_INTERVAL_MS: poll interval in milliseconds
    /// - RUNLENS_POLL_ENABLED: enable polling (true/false)
    /// - RUNLENS_EXPORT_FORMAT: json, csv or markdown
    pub fn merge_with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RUNLENS_BASE_URL") {
            self.source.base_url = url;
        }

        if let Some(dir) = lookup("RUNLENS_RESULTS_DIR") {
            self.source.results_dir = PathBuf::from(dir);
        }

        if let Some(interval) = lookup("RUNLENS_POLL_INTERVAL_MS") {
            match interval.parse() {
                Ok(val) => self.polling.interval_ms = val,
                Err(_) => tracing::warn!(value = %interval, "Ignoring invalid RUNLENS_POLL_INTERVAL_MS"),
            }
        }

        if let Some(enabled) = lookup("RUNLENS_POLL_ENABLED") {
            self.polling.enabled = enabled.parse().unwrap_or(self.polling.enabled);
        }

        if let Some(format) = lookup("RUNLENS_EXPORT_FORMAT") {
            match format.parse() {
                Ok(val) => self.export.format = val,
                Err(e) => tracing::warn!("Ignoring RUNLENS_EXPORT_FORMAT: {}", e),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.polling.interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.polling.enabled);
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.source.results_dir, PathBuf::from(".ezvals/sessions"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DashboardConfig = toml::from_str(
            r#"
            [polling]
            interval_ms = 250

            [export]
            format = "markdown"
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.interval_ms, 250);
        assert!(config.polling.enabled);
        assert_eq!(config.export.format, ExportFormat::Markdown);
        assert_eq!(config.source.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_env_overrides_only_set_values() {
        let env: HashMap<&str, &str> = [
            ("RUNLENS_POLL_INTERVAL_MS", "500"),
            ("RUNLENS_EXPORT_FORMAT", "csv"),
            ("RUNLENS_POLL_ENABLED", "not-a-bool"),
        ]
        .into_iter()
        .collect();

        let config = DashboardConfig::default()
            .merge_with_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.export.format, ExportFormat::Csv);
        assert!(config.polling.enabled);
        assert_eq!(config.source.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlens.toml");
        std::fs::write(&path, "[source]\nbase_url = \"http://eval.local:9000\"\n").unwrap();

        let config = DashboardConfig::from_file(&path).unwrap();
        assert_eq!(config.source.base_url, "http://eval.local:9000");
        assert_eq!(config.source.request_timeout_secs, 10);
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
