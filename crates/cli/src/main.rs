//! cloudsync CLI - mirror a watched directory to its destinations

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod daemon;
mod logging;

/// cloudsync - Watch a directory and push every settled change to each destination
#[derive(Parser)]
#[command(name = "cloudsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON when it ends in .json)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch and sync until interrupted (Ctrl-C)
    Run {
        /// Record operations in memory instead of touching destinations
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and try to construct every destination
    Check,
    /// Print an example configuration
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Run { dry_run } => cmd::run::run(&cli.config, dry_run).await,
        Commands::Check => cmd::check::run(&cli.config),
        Commands::Example => cmd::example::run(),
    }
}
