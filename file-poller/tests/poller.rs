//! End-to-end tests: supervisor, real folders, recording handlers.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codex_file_poller::{
    DetectionRecord, EventHandler, LoopExit, LoopState, PollerError, WatcherConfig, WatcherId,
    WatcherSupervisor,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Forwards every record to a channel.
struct Recorder(mpsc::UnboundedSender<(WatcherId, DetectionRecord)>);

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, watcher: WatcherId, record: &DetectionRecord) -> anyhow::Result<()> {
        self.0.send((watcher, record.clone()))?;
        Ok(())
    }
}

fn recorder() -> (
    Arc<Recorder>,
    mpsc::UnboundedReceiver<(WatcherId, DetectionRecord)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder(tx)), rx)
}

fn data_folder() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("sub")).unwrap();
    File::create(temp_dir.path().join("a.csv")).unwrap();
    File::create(temp_dir.path().join("b.txt")).unwrap();
    File::create(temp_dir.path().join("sub/c.csv")).unwrap();
    temp_dir
}

#[tokio::test(start_paused = true)]
async fn test_one_cycle_reports_csv_files() {
    let data = data_folder();
    let (handler, mut rx) = recorder();

    let mut supervisor = WatcherSupervisor::new();
    let id = supervisor.register(
        WatcherConfig::new(data.path(), r".*\.csv$").with_interval(1),
        handler,
    );
    let running = supervisor.start().unwrap();

    let mut records = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    running.shutdown().await;

    records.sort_by(|a, b| a.1.filepath.cmp(&b.1.filepath));
    let got: Vec<(WatcherId, PathBuf, String)> = records
        .into_iter()
        .map(|(w, r)| (w, r.filepath, r.filename))
        .collect();
    assert_eq!(
        got,
        vec![
            (id, data.path().join("a.csv"), "a.csv".to_string()),
            (id, data.path().join("sub/c.csv"), "c.csv".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_missing_folder_launches_nothing() {
    let data = data_folder();
    let (handler, mut rx) = recorder();

    let mut supervisor = WatcherSupervisor::new();
    supervisor.register(
        WatcherConfig::new(data.path(), ".*").with_interval(1),
        handler.clone(),
    );
    supervisor.register(
        WatcherConfig::new(data.path().join("does-not-exist"), ".*").with_interval(1),
        handler,
    );

    let err = supervisor.start().err().unwrap();
    assert!(matches!(err, PollerError::PathNotFound(_)));
    assert!(err.is_configuration());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_file_root_is_rejected() {
    let data = data_folder();
    let (handler, _rx) = recorder();

    let mut supervisor = WatcherSupervisor::new();
    supervisor.register(
        WatcherConfig::new(data.path().join("a.csv"), ".*").with_interval(1),
        handler,
    );

    assert!(matches!(
        supervisor.start().err().unwrap(),
        PollerError::NotADirectory(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_watcher_does_not_affect_sibling() {
    let doomed = data_folder();
    let healthy = data_folder();
    let (handler, mut rx) = recorder();

    let mut supervisor = WatcherSupervisor::new();
    let doomed_id = supervisor.register(
        WatcherConfig::new(doomed.path(), r"\.csv$").with_interval(1),
        handler.clone(),
    );
    let healthy_id = supervisor.register(
        WatcherConfig::new(healthy.path(), "^a").with_interval(1),
        handler,
    );
    let running = supervisor.start().unwrap();

    drop(doomed);
    assert_eq!(
        running.wait_for_state(doomed_id, LoopState::Stopped).await,
        Some(LoopState::Stopped)
    );

    // The healthy watcher keeps reporting the same file on later cycles.
    let mut cycles = 0;
    while cycles < 3 {
        let (watcher, record) = rx.recv().await.unwrap();
        assert_eq!(watcher, healthy_id);
        assert_eq!(record.filename, "a.csv");
        cycles += 1;
    }

    let exits = running.shutdown().await;
    assert!(matches!(exits[0], (id, LoopExit::ScanFailed(_)) if id == doomed_id));
    assert!(matches!(exits[1], (id, LoopExit::Cancelled) if id == healthy_id));
}

/// Tracks how many handler calls are in flight at once.
#[derive(Default)]
struct OverlapProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl EventHandler for OverlapProbe {
    async fn handle(&self, _watcher: WatcherId, _record: &DetectionRecord) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_never_sees_concurrent_calls() {
    let folders: Vec<TempDir> = (0..4)
        .map(|_| {
            let dir = TempDir::new().unwrap();
            for i in 0..10 {
                File::create(dir.path().join(format!("f{i}.dat"))).unwrap();
            }
            dir
        })
        .collect();
    let probe = Arc::new(OverlapProbe::default());

    let mut supervisor = WatcherSupervisor::new();
    supervisor.register_all(
        folders
            .iter()
            .map(|dir| WatcherConfig::new(dir.path(), r"\.dat$").with_interval(1)),
        probe.clone(),
    );
    let running = supervisor.start().unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while probe.calls.load(Ordering::SeqCst) < 40 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    running.shutdown().await;

    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
}

struct Flaky {
    calls: AtomicUsize,
}

#[async_trait]
impl EventHandler for Flaky {
    async fn handle(&self, _watcher: WatcherId, _record: &DetectionRecord) -> anyhow::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("first delivery rejected");
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_handler_failure_keeps_watcher_polling() {
    let data = data_folder();
    let flaky = Arc::new(Flaky {
        calls: AtomicUsize::new(0),
    });

    let mut supervisor = WatcherSupervisor::new();
    let id = supervisor.register(
        WatcherConfig::new(data.path(), "^a").with_interval(1),
        flaky.clone(),
    );
    let running = supervisor.start().unwrap();

    while flaky.calls.load(Ordering::SeqCst) < 3 {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert_ne!(running.state(id), Some(LoopState::Stopped));
    let stats = running.stats();
    assert_eq!(stats.failed, 1);
    assert!(stats.delivered >= 2);

    running.shutdown().await;
}
