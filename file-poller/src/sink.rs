//! Serialized hand-off of detection records to external handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::PollerError;
use crate::event::DetectionRecord;
use crate::supervisor::WatcherId;

/// Downstream consumer of detection records.
///
/// The sink never invokes a handler concurrently with any other handler
/// call, so implementations need no locking of their own.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one record. An error loses this record only.
    async fn handle(&self, watcher: WatcherId, record: &DetectionRecord) -> anyhow::Result<()>;
}

/// Result of a single dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler accepted the record.
    Delivered,

    /// The record was dropped; the error has already been logged.
    Lost(PollerError),
}

impl DispatchOutcome {
    /// Whether the handler accepted the record.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Routes records to the handler registered for their watcher, one call at a time.
pub struct DispatchSink {
    handlers: HashMap<WatcherId, Arc<dyn EventHandler>>,
    gate: Mutex<()>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DispatchSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            gate: Mutex::new(()),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Register the handler for a watcher. Replaces any previous handler.
    pub fn register(&mut self, watcher: WatcherId, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(watcher, handler);
    }

    /// Whether a handler is registered for `watcher`.
    pub fn contains(&self, watcher: WatcherId) -> bool {
        self.handlers.contains_key(&watcher)
    }

    /// Hand a record to its watcher's handler.
    ///
    /// Failures are logged and counted, never returned as errors.
    pub async fn dispatch(&self, watcher: WatcherId, record: DetectionRecord) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&watcher) else {
            error!(
                "No handler for watcher {watcher}, message {} lost",
                record.message_id
            );
            self.failed.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Lost(PollerError::UnknownWatcher(watcher));
        };

        let _guard = self.gate.lock().await;

        info!(
            message_id = %record.message_id,
            watcher = %watcher,
            path = %record.filepath.display(),
            filename = %record.filename,
            modified_time = record.modified_time,
            "Dispatching detection"
        );

        match handler.handle(watcher, &record).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Delivered
            }
            Err(source) => {
                error!(
                    "Handler for watcher {watcher} failed: {source:#}, message {} lost",
                    record.message_id
                );
                self.failed.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Lost(PollerError::Dispatch { watcher, source })
            }
        }
    }

    /// Delivery counters.
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for DispatchSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about dispatched records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records accepted by a handler.
    pub delivered: u64,

    /// Records dropped after a handler error or a missing handler.
    pub failed: u64,
}
