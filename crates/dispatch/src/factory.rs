//! Destination construction from configuration

use crate::destination::Destination;
use crate::engine::Target;
use crate::local::LocalDirDestination;
use crate::memory::MemoryDestination;
use anyhow::{bail, Context, Result};
use cloudsync_core::{DestinationConfig, SyncConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Destinations ready for dispatch, plus the ones that were left out
#[derive(Debug, Default)]
pub struct BuiltTargets {
    pub targets: Vec<Target>,
    /// Names of destinations with `enable = false`
    pub disabled: Vec<String>,
    /// Destinations whose construction failed
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BuiltTargets {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Build every enabled destination
///
/// A destination that cannot be constructed is logged and skipped; the
/// caller decides what to do when none remain. With `dry_run`, each enabled
/// destination is replaced by an in-memory recorder of the same name.
pub fn build_targets(config: &SyncConfig, dry_run: bool) -> BuiltTargets {
    let mut built = BuiltTargets::default();

    for entry in &config.destinations {
        if !entry.enable {
            debug!(destination = %entry.name, "destination disabled");
            built.disabled.push(entry.name.clone());
            continue;
        }

        let destination = if dry_run {
            Ok(Arc::new(MemoryDestination::new(entry.name.clone())) as Arc<dyn Destination>)
        } else {
            build_destination(entry)
        };

        match destination {
            Ok(destination) => {
                info!(
                    destination = %entry.name,
                    kind = %entry.kind,
                    target = %entry.target,
                    dry_run,
                    "destination ready"
                );
                built.targets.push(Target::new(entry.target.clone(), destination));
            }
            Err(err) => {
                warn!(destination = %entry.name, error = %format!("{:#}", err), "skipping destination");
                built.failed.push((entry.name.clone(), err));
            }
        }
    }

    built
}

/// Construct one destination from its configuration entry
pub fn build_destination(entry: &DestinationConfig) -> Result<Arc<dyn Destination>> {
    match entry.kind.as_str() {
        "local" => {
            let root = entry
                .option("root")
                .with_context(|| format!("destination '{}' needs options.root", entry.name))?;
            let destination = LocalDirDestination::new(entry.name.clone(), root)?;
            Ok(Arc::new(destination))
        }
        "memory" => Ok(Arc::new(MemoryDestination::new(entry.name.clone()))),
        other => bail!("unsupported destination type '{}'", other),
    }
}
