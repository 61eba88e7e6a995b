//! Print an example configuration

use anyhow::Result;
use cloudsync_core::SyncConfig;

pub fn run() -> Result<()> {
    print!("{}", SyncConfig::example());
    Ok(())
}
