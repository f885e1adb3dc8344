//! Configuration Management
//!
//! Optional JSON configuration for gcp-assess plus the environment variables
//! the assessments read. Precedence is CLI flag > environment > config file >
//! built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GCP_ASSESS_CONFIG";
pub const ORGANIZATION_ENV: &str = "GCP_ORGANIZATION_ID";
pub const FOLDER_ENV: &str = "GCP_FOLDER_ID";
pub const PROJECT_IDS_ENV: &str = "GCP_PROJECT_IDS";
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Binaries used for each external tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub gcloud: String,
    pub gsutil: String,
    pub kubectl: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gcloud: "gcloud".to_string(),
            gsutil: "gsutil".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parallel project workers per assessment
    pub max_workers: usize,
    /// Pause after each collector call, in milliseconds
    pub request_delay_ms: u64,
    /// Timeout for data queries, in seconds
    pub command_timeout_secs: u64,
    pub tools: ToolPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            tools: ToolPaths::default(),
        }
    }
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        if let Some(path) = env_var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("gcp-assess").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file. A missing or malformed file
    /// yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Effective worker count (CLI > config); never zero
    pub fn effective_max_workers(&self, cli: Option<usize>) -> usize {
        cli.unwrap_or(self.max_workers).max(1)
    }
}

/// Read a non-empty environment variable
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated project list, dropping blanks
pub fn parse_project_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
