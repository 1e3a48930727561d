//! Starts one watch loop per configured folder and tracks them.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::WatcherConfig;
use crate::error::Result;
use crate::sink::{DispatchSink, EventHandler, SinkStats};
use crate::watch_loop::{LoopExit, LoopState, WatchLoop};

/// Stable identifier of a watcher, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(pub usize);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collects watcher registrations before startup.
pub struct WatcherSupervisor {
    registrations: Vec<(WatcherConfig, Arc<dyn EventHandler>)>,
}

impl WatcherSupervisor {
    /// Create an empty supervisor.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a folder and the handler that receives its records.
    pub fn register(&mut self, config: WatcherConfig, handler: Arc<dyn EventHandler>) -> WatcherId {
        let id = WatcherId(self.registrations.len());
        self.registrations.push((config, handler));
        id
    }

    /// Register several folders sharing one handler.
    pub fn register_all(
        &mut self,
        configs: impl IntoIterator<Item = WatcherConfig>,
        handler: Arc<dyn EventHandler>,
    ) -> Vec<WatcherId> {
        configs
            .into_iter()
            .map(|config| self.register(config, handler.clone()))
            .collect()
    }

    /// Number of registered watchers.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Validate every registration and launch one task per watcher.
    ///
    /// If any configuration is invalid, or there is no Tokio runtime to
    /// spawn on, nothing is launched.
    pub fn start(self) -> Result<RunningSupervisor> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let mut sink = DispatchSink::new();
        let mut loops = Vec::with_capacity(self.registrations.len());

        for (index, (config, handler)) in self.registrations.into_iter().enumerate() {
            let id = WatcherId(index);
            let label = config.label();
            let watch_loop = WatchLoop::new(id, config).inspect_err(|err| {
                error!("Watcher {id} ({label}) rejected: {err}");
            })?;
            sink.register(id, handler);
            loops.push((label, watch_loop));
        }

        let sink = Arc::new(sink);
        let cancel = CancellationToken::new();

        let watchers = loops
            .into_iter()
            .map(|(label, watch_loop)| {
                let id = watch_loop.id();
                let state = watch_loop.subscribe();
                info!("Starting watcher {id}: {label}");
                let task = runtime.spawn(watch_loop.run(sink.clone(), cancel.child_token()));
                WatcherHandle {
                    id,
                    label,
                    state,
                    task,
                }
            })
            .collect::<Vec<_>>();

        info!("Started {} watcher(s)", watchers.len());

        Ok(RunningSupervisor {
            watchers,
            sink,
            cancel,
        })
    }
}

impl Default for WatcherSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// A launched watcher.
struct WatcherHandle {
    id: WatcherId,
    label: String,
    state: watch::Receiver<LoopState>,
    task: JoinHandle<LoopExit>,
}

/// The set of running watchers.
pub struct RunningSupervisor {
    watchers: Vec<WatcherHandle>,
    sink: Arc<DispatchSink>,
    cancel: CancellationToken,
}

impl RunningSupervisor {
    /// Ids of all launched watchers.
    pub fn watcher_ids(&self) -> Vec<WatcherId> {
        self.watchers.iter().map(|w| w.id).collect()
    }

    /// Number of launched watchers.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether no watchers were launched.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Current state of a watcher.
    pub fn state(&self, id: WatcherId) -> Option<LoopState> {
        self.watchers
            .iter()
            .find(|w| w.id == id)
            .map(|w| *w.state.borrow())
    }

    /// Wait until a watcher reaches `target`. Returns `None` for unknown ids.
    pub async fn wait_for_state(&self, id: WatcherId, target: LoopState) -> Option<LoopState> {
        let mut state = self.watchers.iter().find(|w| w.id == id)?.state.clone();
        state.wait_for(|s| *s == target).await.ok().map(|s| *s)
    }

    /// Delivery counters across all watchers.
    pub fn stats(&self) -> SinkStats {
        self.sink.stats()
    }

    /// Token that stops every watcher when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every watcher and wait for them to finish.
    pub async fn shutdown(self) -> Vec<(WatcherId, LoopExit)> {
        info!("Stopping {} watcher(s)", self.watchers.len());
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for every watcher to finish on its own.
    ///
    /// Watchers are joined concurrently, so each exit is logged as it
    /// happens. Results are returned in id order.
    pub async fn wait(self) -> Vec<(WatcherId, LoopExit)> {
        join_all(self.watchers.into_iter().map(|watcher| async move {
            let exit = match watcher.task.await {
                Ok(exit) => exit,
                Err(err) => {
                    error!("Watcher {} ({}) panicked: {err}", watcher.id, watcher.label);
                    LoopExit::Panicked(err.to_string())
                }
            };
            (watcher.id, exit)
        }))
        .await
    }
}
