//! # File Poller
//!
//! Periodically scans folders and emits an event for every file whose name
//! matches a regular expression. This is a pure polling design: no OS
//! change notifications, no deduplication across cycles, and best-effort
//! delivery.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          File Poller                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatcherSupervisor ──► WatchLoop (one task per folder)          │
//! │                            │                                    │
//! │                            ▼                                    │
//! │        scan ──► PatternMatcher ──► DetectionRecord              │
//! │                                          │                      │
//! │                                          ▼                      │
//! │                   DispatchSink (serialized) ──► EventHandler    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod matcher;
pub mod scanner;
pub mod sink;
pub mod supervisor;
pub mod watch_loop;

pub use config::{PollerConfig, ScanErrorPolicy, WatcherConfig};
pub use error::{PollerError, Result};
pub use event::DetectionRecord;
pub use matcher::PatternMatcher;
pub use scanner::{FileEntry, scan};
pub use sink::{DispatchOutcome, DispatchSink, EventHandler, SinkStats};
pub use supervisor::{RunningSupervisor, WatcherId, WatcherSupervisor};
pub use watch_loop::{CycleSummary, LoopExit, LoopState, WatchLoop};
