use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use codex_file_poller::{
    DetectionRecord, EventHandler, LoopExit, PollerConfig, WatcherId, WatcherSupervisor,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Poll folders and print one JSON line per matching file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML (or `.json`) file with `[[watcher]]` entries.
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Writes each record to stdout as a JSON line.
struct JsonLinesHandler;

#[async_trait]
impl EventHandler for JsonLinesHandler {
    async fn handle(&self, watcher: WatcherId, record: &DetectionRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(&serde_json::json!({
            "watcher": watcher,
            "event": record,
        }))?;
        line.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = PollerConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let mut supervisor = WatcherSupervisor::new();
    supervisor.register_all(config.watchers, Arc::new(JsonLinesHandler));
    let running = supervisor.start().context("failed to start watchers")?;

    let cancel = running.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            cancel.cancel();
        }
    });

    exit_status(running.wait().await)
}

/// Fails unless every watcher ended by cancellation.
fn exit_status(exits: Vec<(WatcherId, LoopExit)>) -> anyhow::Result<()> {
    let mut failed = 0;
    for (id, exit) in &exits {
        match exit {
            LoopExit::Cancelled => {}
            LoopExit::ScanFailed(err) => {
                warn!("Watcher {id} stopped after scan error: {err}");
                failed += 1;
            }
            LoopExit::Panicked(msg) => {
                warn!("Watcher {id} panicked: {msg}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} watcher(s) failed", exits.len());
    }
    Ok(())
}
