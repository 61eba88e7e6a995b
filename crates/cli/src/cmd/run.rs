//! Watch and sync until interrupted

use crate::daemon;
use anyhow::{bail, Result};
use cloudsync_core::SyncConfig;
use cloudsync_dispatch::build_targets;
use owo_colors::OwoColorize;
use std::path::Path;
use tracing::{error, info};

pub async fn run(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = SyncConfig::load(config_path)?;

    let built = build_targets(&config, dry_run);
    if built.is_empty() {
        bail!(
            "No usable destination in {} ({} disabled, {} failed to start)",
            config_path.display(),
            built.disabled.len(),
            built.failed.len()
        );
    }

    println!(
        "{} {} → {} destination(s){}",
        "Syncing".green().bold(),
        config.watch_dir.display().to_string().cyan(),
        built.targets.len(),
        if dry_run { " (dry run)".yellow().to_string() } else { String::new() }
    );
    for (name, err) in &built.failed {
        println!("  {} {}: {:#}", "skipped".yellow(), name, err);
    }
    println!("Press Ctrl-C to stop");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "cannot listen for Ctrl-C, stopping");
        }
    };

    let summary = daemon::run_until(&config, built.targets, shutdown).await?;
    info!(?summary, "sync stopped");

    println!();
    println!("{}", "Summary".bold());
    println!("  Events:     {}", summary.events);
    println!("  Uploaded:   {}", summary.uploaded.to_string().green());
    println!("  Unchanged:  {}", summary.unchanged);
    println!("  Deleted:    {}", summary.deleted);
    if summary.failed > 0 {
        println!("  Failed:     {}", summary.failed.to_string().red());
    } else {
        println!("  Failed:     0");
    }
    if dry_run {
        println!("{}", "Dry run: no destination was modified".yellow());
    }

    Ok(())
}
