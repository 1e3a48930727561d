//! Error types for the file poller.

use std::path::PathBuf;

use thiserror::Error;

use crate::supervisor::WatcherId;

/// Result type alias for poller operations.
pub type Result<T> = std::result::Result<T, PollerError>;

/// Errors that can occur in the file poller.
#[derive(Error, Debug)]
pub enum PollerError {
    /// Watched folder does not exist.
    #[error("folder not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Watched path exists but is not a directory.
    #[error("not a folder: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Filename pattern is not a valid regular expression.
    #[error("invalid filename pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Watched folder exists but could not be inspected.
    #[error("cannot access folder {}: {source}", path.display())]
    FolderAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Poll interval is zero or negative.
    #[error("invalid check interval: {0}s (must be greater than zero)")]
    InvalidInterval(i64),

    /// A path became inaccessible while walking the folder.
    #[error("scan failed at {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },

    /// The external handler rejected a record.
    #[error("handler for watcher {watcher} failed: {source}")]
    Dispatch {
        watcher: WatcherId,
        #[source]
        source: anyhow::Error,
    },

    /// No handler is registered under the given watcher id.
    #[error("no handler registered for watcher {0}")]
    UnknownWatcher(WatcherId),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON configuration could not be parsed.
    #[error("invalid json config: {0}")]
    ConfigJson(#[source] serde_json::Error),

    /// A wire record could not be decoded.
    #[error("cannot decode detection record: {0}")]
    Decode(String),

    /// No Tokio runtime is available to run watchers on.
    #[error("no tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// TOML parse error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PollerError {
    /// Errors that stop a watcher (or the whole supervisor) from starting.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_)
                | Self::NotADirectory(_)
                | Self::InvalidPattern { .. }
                | Self::FolderAccess { .. }
                | Self::InvalidInterval(_)
                | Self::Config(_)
                | Self::ConfigFile { .. }
                | Self::ConfigJson(_)
                | Self::Toml(_)
        )
    }

    /// Errors that end a single watch loop.
    pub fn is_scan(&self) -> bool {
        matches!(self, Self::Scan { .. })
    }

    /// Errors raised while handing a record to an external handler.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. } | Self::UnknownWatcher(_))
    }
}

impl From<walkdir::Error> for PollerError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        Self::Scan {
            path,
            message: err.to_string(),
        }
    }
}
