//! Sync configuration
//!
//! Loaded once at startup and treated as immutable for the rest of the run.
//! TOML is the native format; files ending in `.json` are parsed as JSON so
//! older `config.json` files keep working (`delay_time`, `providers` and
//! `tokens` are accepted as aliases).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted quiet period
pub const MAX_DELAY_SECS: u64 = 3600;

/// Destination types this build knows how to construct
pub const KNOWN_DESTINATION_TYPES: &[&str] = &["local", "memory"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory tree to watch
    pub watch_dir: PathBuf,

    /// Quiet period in seconds before a burst of changes is forwarded
    #[serde(default = "default_delay_secs", alias = "delay_time")]
    pub delay_secs: u64,

    /// Extra gitignore-style patterns, relative to `watch_dir`
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Remote destinations, in logging order
    #[serde(default, alias = "providers")]
    pub destinations: Vec<DestinationConfig>,
}

/// One configured destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Backend type (`local`, `memory`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Name used in logs and results
    pub name: String,

    /// Disabled destinations are skipped at startup
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Remote-side prefix every synced path is placed under
    #[serde(default)]
    pub target: String,

    /// Backend-specific settings
    #[serde(default, alias = "tokens")]
    pub options: BTreeMap<String, String>,
}

impl DestinationConfig {
    /// Look up a backend option
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl SyncConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if is_json(path) {
            Self::from_json(&text)
        } else {
            Self::from_toml(&text)
        }
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        Ok(config)
    }

    /// Parse TOML text (not validated)
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Parse JSON text (not validated)
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Quiet period as a duration
    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Destinations with `enable = true`, in configured order
    pub fn enabled_destinations(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter().filter(|d| d.enable)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.watch_dir.as_os_str().is_empty() {
            anyhow::bail!("watch_dir must not be empty");
        }

        if self.delay_secs > MAX_DELAY_SECS {
            anyhow::bail!(
                "delay_secs must be between 0 and {} (got {})",
                MAX_DELAY_SECS,
                self.delay_secs
            );
        }

        let mut names = HashSet::new();
        for dest in &self.destinations {
            if dest.name.trim().is_empty() {
                anyhow::bail!("destination of type '{}' has an empty name", dest.kind);
            }
            if !names.insert(dest.name.as_str()) {
                anyhow::bail!("duplicate destination name '{}'", dest.name);
            }

            if dest.kind == "local" {
                let root = dest.option("root").ok_or_else(|| {
                    anyhow::anyhow!("destination '{}' (local) requires options.root", dest.name)
                })?;
                // Mirroring into the watched tree would feed every copy back in
                if Path::new(root).starts_with(&self.watch_dir) {
                    anyhow::bail!(
                        "destination '{}' mirrors into {}, which is inside watch_dir",
                        dest.name,
                        root
                    );
                }
            }
        }

        Ok(())
    }

    /// Example configuration with every field present
    pub fn example() -> String {
        r#"# cloudsync configuration

# Directory tree to watch (hidden entries are always skipped)
watch_dir = "/srv/outbox"

# Seconds a path must stay quiet before its change is forwarded
delay_secs = 3

# Extra gitignore-style patterns, relative to watch_dir
ignore = ["*.tmp", "*.part", "build/"]

[[destinations]]
type = "local"
name = "nas"
target = "backup/outbox"

[destinations.options]
root = "/mnt/nas"

[[destinations]]
type = "memory"
name = "preview"
enable = false
target = "outbox"
"#
        .to_string()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

fn default_delay_secs() -> u64 {
    3
}

fn default_true() -> bool {
    true
}
