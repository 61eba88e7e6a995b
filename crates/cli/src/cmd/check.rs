//! Validate configuration and destinations

use anyhow::{bail, Result};
use cloudsync_core::config::KNOWN_DESTINATION_TYPES;
use cloudsync_core::SyncConfig;
use cloudsync_dispatch::build_destination;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)?;

    println!("{}", "Configuration".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("File:          {}", config_path.display().to_string().cyan());

    print!("Watch dir:     {} ", config.watch_dir.display());
    if config.watch_dir.is_dir() {
        println!("{}", "✓".green());
    } else {
        println!("{}", "(not found)".red());
    }
    println!("Quiet period:  {}s", config.delay_secs);
    if config.ignore.is_empty() {
        println!("Ignore:        (hidden entries only)");
    } else {
        println!("Ignore:        {}", config.ignore.join(", "));
    }
    println!();

    println!("{}", "Destinations".bold());
    let mut usable = 0;
    for entry in &config.destinations {
        let label = format!("{} ({}, target '{}')", entry.name, entry.kind, entry.target);

        if !entry.enable {
            println!("  {} {}", "-".dimmed(), label.dimmed());
            continue;
        }
        if !KNOWN_DESTINATION_TYPES.contains(&entry.kind.as_str()) {
            println!("  {} {}: unsupported type", "✗".red(), label);
            continue;
        }

        match build_destination(entry) {
            Ok(_) => {
                usable += 1;
                println!("  {} {}", "✓".green(), label);
            }
            Err(err) => println!("  {} {}: {:#}", "✗".red(), label, err),
        }
    }

    if usable == 0 {
        bail!("No usable destination");
    }

    println!();
    println!("{} {} destination(s) ready", "OK".green().bold(), usable);
    Ok(())
}
