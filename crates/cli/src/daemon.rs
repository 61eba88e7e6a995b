//! Sync lifecycle management

use anyhow::{Context, Result};
use cloudsync_core::SyncConfig;
use cloudsync_dispatch::{DispatchEngine, DispatchSummary, Target};
use cloudsync_watcher::{WatchOptions, Watcher};
use std::future::Future;
use tracing::info;

/// Watch and dispatch until `shutdown` resolves
///
/// On shutdown the watcher stops first (pending quiet periods are dropped
/// and nothing new is emitted), then in-flight dispatches are drained.
pub async fn run_until<F>(config: &SyncConfig, targets: Vec<Target>, shutdown: F) -> Result<DispatchSummary>
where
    F: Future<Output = ()>,
{
    let options = WatchOptions {
        quiet_period: config.quiet_period(),
        ignore: config.ignore.clone(),
    };

    let (mut watcher, events) = Watcher::new(&config.watch_dir, options)
        .with_context(|| format!("Failed to watch {}", config.watch_dir.display()))?;
    watcher.start();

    let engine = DispatchEngine::new(watcher.root(), targets);
    let dispatch = tokio::spawn(async move { engine.run(events).await });

    shutdown.await;
    info!("shutdown requested");

    watcher.stop().await;
    let summary = dispatch.await.context("Dispatch loop failed")?;

    Ok(summary)
}
