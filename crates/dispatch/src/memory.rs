//! In-memory destination
//!
//! Keeps a remote tree of fingerprints instead of content. Backs `--dry-run`
//! and stands in for real destinations in tests, with optional injected
//! failure and latency.

use crate::destination::{Destination, Transfer};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cloudsync_core::{fingerprint_file_stable, Fingerprint};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Read attempts before a file still being written is reported
const STABLE_READ_ATTEMPTS: u8 = 3;

/// A remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEntry {
    File { fingerprint: Fingerprint, len: u64 },
    Dir,
}

/// A successful call, in the order it completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Upload { remote: String, transfer: Transfer },
    Delete { remote: String },
    CreateDir { remote: String },
}

impl Operation {
    pub fn remote(&self) -> &str {
        match self {
            Operation::Upload { remote, .. }
            | Operation::Delete { remote }
            | Operation::CreateDir { remote } => remote,
        }
    }
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, MemoryEntry>,
    operations: Vec<Operation>,
    failure: Option<String>,
}

pub struct MemoryDestination {
    name: String,
    latency: Option<Duration>,
    transfers: AtomicU64,
    state: Mutex<State>,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: None,
            transfers: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every subsequent call with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().failure = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }

    pub fn entry(&self, remote: &str) -> Option<MemoryEntry> {
        self.state.lock().entries.get(remote).copied()
    }

    pub fn contains(&self, remote: &str) -> bool {
        self.state.lock().entries.contains_key(remote)
    }

    /// Remote paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Number of uploads that actually moved content
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().operations.clone()
    }

    async fn enter(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.state.lock().failure {
            Some(message) => Err(anyhow!("{}: {}", self.name, message)),
            None => Ok(()),
        }
    }
}

fn ensure_ancestors(entries: &mut BTreeMap<String, MemoryEntry>, remote: &str) {
    let mut end = 0;
    while let Some(offset) = remote[end..].find('/') {
        end += offset;
        if end > 0 {
            entries
                .entry(remote[..end].to_string())
                .or_insert(MemoryEntry::Dir);
        }
        end += 1;
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<Transfer> {
        self.enter().await?;

        let owned: PathBuf = local.to_path_buf();
        let local_state = tokio::task::spawn_blocking(move || -> Result<Option<(Fingerprint, u64)>> {
            let meta = std::fs::metadata(&owned)
                .with_context(|| format!("Failed to stat {}", owned.display()))?;
            if meta.is_dir() {
                return Ok(None);
            }
            let fingerprint = fingerprint_file_stable(&owned, STABLE_READ_ATTEMPTS)?;
            Ok(Some((fingerprint, meta.len())))
        })
        .await
        .context("fingerprint task failed")??;

        let mut state = self.state.lock();
        let transfer = match local_state {
            None => {
                ensure_ancestors(&mut state.entries, remote);
                state.entries.insert(remote.to_string(), MemoryEntry::Dir);
                Transfer::DirectoryEnsured
            }
            Some((fingerprint, len)) => {
                let current = MemoryEntry::File { fingerprint, len };
                if state.entries.get(remote) == Some(&current) {
                    Transfer::Unchanged
                } else {
                    ensure_ancestors(&mut state.entries, remote);
                    state.entries.insert(remote.to_string(), current);
                    self.transfers.fetch_add(1, Ordering::Relaxed);
                    Transfer::Uploaded { bytes: len }
                }
            }
        };

        state.operations.push(Operation::Upload {
            remote: remote.to_string(),
            transfer,
        });
        Ok(transfer)
    }

    async fn delete(&self, remote: &str) -> Result<()> {
        self.enter().await?;

        let mut state = self.state.lock();
        let target = remote.trim_end_matches('/');
        if target.is_empty() {
            // The destination root: everything below it goes
            state.entries.clear();
        } else {
            let prefix = format!("{}/", target);
            state
                .entries
                .retain(|path, _| path != target && !path.starts_with(&prefix));
        }
        state.operations.push(Operation::Delete {
            remote: remote.to_string(),
        });
        Ok(())
    }

    async fn create_dir(&self, remote: &str) -> Result<()> {
        self.enter().await?;

        let mut state = self.state.lock();
        ensure_ancestors(&mut state.entries, remote);
        state.entries.insert(remote.to_string(), MemoryEntry::Dir);
        state.operations.push(Operation::CreateDir {
            remote: remote.to_string(),
        });
        Ok(())
    }
}
