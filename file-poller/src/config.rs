//! Configuration types for folder polling.
//!
//! The filename pattern is a **regular expression**, not a shell glob. It is
//! searched for anywhere in the file's base name, so `\.csv$` selects CSV
//! files while `*.csv` is rejected as an invalid pattern (a bare `*` has
//! nothing to repeat). Glob-style input is never converted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PollerError, Result};

/// Configuration for a single polled folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Optional label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Root folder to scan recursively.
    #[serde(alias = "Foldername")]
    pub folder: PathBuf,

    /// Regular expression matched against file base names.
    #[serde(alias = "Filepattern")]
    pub pattern: String,

    /// Seconds to sleep between scans. Validated when the loop is built.
    #[serde(alias = "CheckInterval")]
    pub check_interval_secs: i64,

    /// What to do when a path becomes unreadable mid-scan.
    #[serde(default)]
    pub on_scan_error: ScanErrorPolicy,
}

impl WatcherConfig {
    /// Default seconds between scans.
    pub const DEFAULT_INTERVAL_SECS: i64 = 5;

    /// Create a new watcher config.
    pub fn new(folder: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            name: None,
            folder: folder.into(),
            pattern: pattern.into(),
            check_interval_secs: Self::DEFAULT_INTERVAL_SECS,
            on_scan_error: ScanErrorPolicy::default(),
        }
    }

    /// Set the poll interval in seconds.
    pub fn with_interval(mut self, secs: i64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    /// Set the log label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the scan error policy.
    pub fn with_scan_error_policy(mut self, policy: ScanErrorPolicy) -> Self {
        self.on_scan_error = policy;
        self
    }

    /// The validated poll interval.
    pub fn poll_interval(&self) -> Result<Duration> {
        match u64::try_from(self.check_interval_secs) {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(PollerError::InvalidInterval(self.check_interval_secs)),
        }
    }

    /// Label for logs: the configured name, or the folder path.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.folder.display().to_string(),
        }
    }
}

/// Behaviour when an entry cannot be read during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorPolicy {
    /// Stop the watcher permanently.
    #[default]
    Abort,

    /// Log the entry and keep walking.
    Skip,
}

/// Top-level configuration: one entry per watched folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Watched folders.
    #[serde(default, rename = "watcher")]
    pub watchers: Vec<WatcherConfig>,
}

impl PollerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(PollerError::ConfigJson)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| PollerError::ConfigFile {
                path: path.to_path_buf(),
                source,
            })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_toml_str(&contents)?
        };

        if config.watchers.is_empty() {
            return Err(PollerError::Config(format!(
                "no watchers configured in {}",
                path.display()
            )));
        }

        Ok(config)
    }
}
