//! Per-folder polling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ScanErrorPolicy, WatcherConfig};
use crate::error::{PollerError, Result};
use crate::event::DetectionRecord;
use crate::matcher::PatternMatcher;
use crate::scanner::{self, FileEntry};
use crate::sink::DispatchSink;
use crate::supervisor::WatcherId;

/// Entries buffered between the blocking walker and the dispatching task.
const SCAN_BUFFER: usize = 256;

/// Where a loop currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Sleeping until the next poll.
    Idle,

    /// Walking the folder.
    Scanning,

    /// Handing a matched record to the sink.
    Dispatching,

    /// Finished; no further polling.
    Stopped,
}

/// Why a loop finished.
#[derive(Debug)]
pub enum LoopExit {
    /// Shutdown was requested.
    Cancelled,

    /// A scan failed and the watcher stopped permanently.
    ScanFailed(PollerError),

    /// The loop's task panicked.
    Panicked(String),
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Entries visited, directories included.
    pub scanned: usize,

    /// Unreadable entries passed over under [`ScanErrorPolicy::Skip`].
    pub skipped: usize,

    /// Regular files whose name matched.
    pub matched: usize,

    /// Matches the handler accepted.
    pub delivered: usize,
}

/// Polls one folder on a fixed interval and dispatches every match.
pub struct WatchLoop {
    id: WatcherId,
    config: WatcherConfig,
    matcher: PatternMatcher,
    interval: Duration,
    state: watch::Sender<LoopState>,
}

impl WatchLoop {
    /// Validate `config` and build a loop. Nothing is polled until [`run`](Self::run).
    pub fn new(id: WatcherId, config: WatcherConfig) -> Result<Self> {
        if config.folder.as_os_str().is_empty() {
            return Err(PollerError::Config("folder not set".to_string()));
        }

        let interval = config.poll_interval()?;

        match std::fs::metadata(&config.folder) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(PollerError::NotADirectory(config.folder.clone())),
            // NotADirectory here means a parent component is a regular file.
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                return Err(PollerError::PathNotFound(config.folder.clone()));
            }
            Err(source) => {
                return Err(PollerError::FolderAccess {
                    path: config.folder.clone(),
                    source,
                });
            }
        }

        let matcher = PatternMatcher::compile(&config.pattern)?;
        let (state, _) = watch::channel(LoopState::Idle);

        Ok(Self {
            id,
            config,
            matcher,
            interval,
            state,
        })
    }

    /// The watcher id.
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// The configuration this loop was built from.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Poll until cancelled or until a scan fails.
    ///
    /// Each cycle sleeps for the full interval before scanning, so the first
    /// scan happens one interval after the loop starts and the time spent
    /// scanning is never subtracted from the next sleep.
    pub async fn run(self, sink: Arc<DispatchSink>, cancel: CancellationToken) -> LoopExit {
        let span = info_span!(
            "watcher",
            id = %self.id,
            name = %self.config.label(),
        );

        async move {
            info!(
                "Watching {} for `{}` every {}s",
                self.config.folder.display(),
                self.matcher.as_str(),
                self.interval.as_secs()
            );

            loop {
                self.set_state(LoopState::Idle);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }

                if cancel.is_cancelled() {
                    break;
                }

                match self.poll_once(&sink).await {
                    Ok(summary) => debug!(
                        "Cycle done: scanned {}, matched {}, delivered {}, skipped {}",
                        summary.scanned, summary.matched, summary.delivered, summary.skipped
                    ),
                    Err(err) => {
                        error!("Scan failed, watcher stopped: {err}");
                        self.set_state(LoopState::Stopped);
                        return LoopExit::ScanFailed(err);
                    }
                }
            }

            info!("Watcher cancelled");
            self.set_state(LoopState::Stopped);
            LoopExit::Cancelled
        }
        .instrument(span)
        .await
    }

    /// Run a single scan-and-dispatch pass without sleeping.
    pub async fn poll_once(&self, sink: &DispatchSink) -> Result<CycleSummary> {
        self.set_state(LoopState::Scanning);

        let (tx, mut rx) = mpsc::channel(SCAN_BUFFER);
        let root = self.config.folder.clone();
        let walker = tokio::task::spawn_blocking(move || {
            for entry in scanner::scan(&root) {
                if tx.blocking_send(entry).is_err() {
                    // Receiver dropped after an aborting error.
                    break;
                }
            }
        });

        let mut summary = CycleSummary::default();
        let mut failure = None;

        while let Some(entry) = rx.recv().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => match self.config.on_scan_error {
                    ScanErrorPolicy::Abort => {
                        failure = Some(err);
                        break;
                    }
                    ScanErrorPolicy::Skip => {
                        warn!("Skipping unreadable entry: {err}");
                        summary.skipped += 1;
                        continue;
                    }
                },
            };

            summary.scanned += 1;
            if !self.accepts(&entry) {
                continue;
            }
            summary.matched += 1;

            self.set_state(LoopState::Dispatching);
            let record = DetectionRecord::new(&entry, Utc::now());
            if sink.dispatch(self.id, record).await.is_delivered() {
                summary.delivered += 1;
            }
            self.set_state(LoopState::Scanning);
        }
        drop(rx);

        if let Err(err) = walker.await {
            return Err(PollerError::Scan {
                path: self.config.folder.clone(),
                message: format!("walker task failed: {err}"),
            });
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn accepts(&self, entry: &FileEntry) -> bool {
        !entry.is_directory && self.matcher.matches(&entry.name)
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }
}
