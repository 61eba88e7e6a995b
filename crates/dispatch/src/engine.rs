//! Dispatch engine
//!
//! One logical event fans out to every destination at once; the event counts
//! as dispatched when all of them have answered. [`DispatchEngine::run`]
//! drives a whole event stream, overlapping different paths while keeping
//! events of the same path strictly in order.

use crate::destination::{Destination, Transfer};
use crate::error::DispatchError;
use crate::remote_path::remote_path_for;
use cloudsync_core::LogicalEvent;
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

/// One destination together with the root it receives files under
#[derive(Clone)]
pub struct Target {
    pub root: String,
    pub destination: Arc<dyn Destination>,
}

impl Target {
    pub fn new(root: impl Into<String>, destination: Arc<dyn Destination>) -> Self {
        Self {
            root: root.into(),
            destination,
        }
    }

    pub fn name(&self) -> &str {
        self.destination.name()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.destination.name())
            .field("root", &self.root)
            .finish()
    }
}

/// Remote operation chosen for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Upload,
    Delete,
}

impl Action {
    /// Removals (and the old name of a rename) delete; everything else makes
    /// the remote match the local path
    pub fn for_event(event: &LogicalEvent) -> Self {
        if event.kind.is_removal() {
            Action::Delete
        } else {
            Action::Upload
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upload => f.write_str("upload"),
            Action::Delete => f.write_str("delete"),
        }
    }
}

/// Outcome of one event at one destination
#[derive(Debug)]
pub struct DispatchResult {
    pub destination: String,
    pub remote_path: String,
    pub action: Action,
    pub outcome: Result<Transfer, DispatchError>,
}

impl DispatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Totals for one [`DispatchEngine::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Logical events received
    pub events: u64,
    /// Destination calls that wrote content or ensured a directory
    pub uploaded: u64,
    /// Uploads skipped because the remote already matched
    pub unchanged: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl DispatchSummary {
    fn record(&mut self, result: &DispatchResult) {
        match &result.outcome {
            Ok(Transfer::Uploaded { .. }) | Ok(Transfer::DirectoryEnsured) => self.uploaded += 1,
            Ok(Transfer::Unchanged) => self.unchanged += 1,
            Ok(Transfer::Deleted) => self.deleted += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Sends logical events to every configured destination
///
/// The destination list is fixed at construction. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    watch_root: PathBuf,
    targets: Arc<[Target]>,
}

impl DispatchEngine {
    pub fn new(watch_root: impl Into<PathBuf>, targets: Vec<Target>) -> Self {
        Self {
            watch_root: watch_root.into(),
            targets: targets.into(),
        }
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Dispatch one event to all destinations concurrently
    ///
    /// Returns one result per destination, in destination order. A failure
    /// (or panic) at one destination never affects the others. No retry.
    pub async fn dispatch(&self, event: &LogicalEvent) -> Vec<DispatchResult> {
        let action = Action::for_event(event);

        let calls: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let remote = remote_path_for(&event.path, &self.watch_root, &target.root);
                let handle = tokio::spawn(perform(
                    Arc::clone(&target.destination),
                    action,
                    event.path.clone(),
                    remote.clone(),
                ));
                (target.name().to_string(), remote, handle)
            })
            .collect();

        let (meta, handles): (Vec<_>, Vec<_>) = calls
            .into_iter()
            .map(|(name, remote, handle)| ((name, remote), handle))
            .unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(meta)
            .map(|(joined, (destination, remote_path))| {
                let outcome = joined.unwrap_or_else(|err| {
                    Err(DispatchError::Aborted {
                        action,
                        remote_path: remote_path.clone(),
                        reason: err.to_string(),
                    })
                });
                DispatchResult {
                    destination,
                    remote_path,
                    action,
                    outcome,
                }
            })
            .collect()
    }

    /// Dispatch a whole event stream
    ///
    /// Events of different paths run concurrently. An event whose path still
    /// has a dispatch in flight waits for it. Returns once the stream has
    /// ended and every dispatch has completed.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<LogicalEvent>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut in_flight: JoinSet<(PathBuf, Vec<DispatchResult>)> = JoinSet::new();
        // Paths with a dispatch in flight, and the events waiting behind it
        let mut busy: HashMap<PathBuf, VecDeque<LogicalEvent>> = HashMap::new();
        // Path of each in-flight task, for tasks that end without returning it
        let mut owners: HashMap<task::Id, PathBuf> = HashMap::new();
        let mut open = true;

        info!(destinations = self.targets.len(), "dispatch loop started");

        loop {
            tokio::select! {
                received = events.recv(), if open => match received {
                    Some(event) => {
                        summary.events += 1;
                        match busy.get_mut(&event.path) {
                            Some(queue) => {
                                debug!(path = %event.path.display(), "queued behind in-flight dispatch");
                                queue.push_back(event);
                            }
                            None => {
                                busy.insert(event.path.clone(), VecDeque::new());
                                self.spawn_dispatch(&mut in_flight, &mut owners, event);
                            }
                        }
                    }
                    None => {
                        debug!(in_flight = in_flight.len(), "event stream closed, draining");
                        open = false;
                    }
                },

                Some(joined) = in_flight.join_next_with_id() => {
                    let path = match joined {
                        Ok((id, (path, results))) => {
                            owners.remove(&id);
                            for result in &results {
                                summary.record(result);
                                log_result(&path, result);
                            }
                            Some(path)
                        }
                        Err(err) => {
                            let path = owners.remove(&err.id());
                            // No results came back: count every destination as failed
                            summary.failed += self.targets.len() as u64;
                            error!(
                                path = %path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                                error = %err,
                                "dispatch task failed"
                            );
                            path
                        }
                    };

                    if let Some(path) = path {
                        match busy.get_mut(&path).and_then(VecDeque::pop_front) {
                            Some(next) => self.spawn_dispatch(&mut in_flight, &mut owners, next),
                            None => {
                                busy.remove(&path);
                            }
                        }
                    }
                },

                else => break,
            }
        }

        info!(
            events = summary.events,
            uploaded = summary.uploaded,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            failed = summary.failed,
            "dispatch loop finished"
        );
        summary
    }

    fn spawn_dispatch(
        &self,
        in_flight: &mut JoinSet<(PathBuf, Vec<DispatchResult>)>,
        owners: &mut HashMap<task::Id, PathBuf>,
        event: LogicalEvent,
    ) {
        let engine = self.clone();
        let path = event.path.clone();
        let handle = in_flight.spawn(async move {
            let started = Instant::now();
            let results = engine.dispatch(&event).await;
            debug!(
                path = %event.path.display(),
                kind = %event.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "event dispatched"
            );
            (event.path, results)
        });
        owners.insert(handle.id(), path);
    }
}

async fn perform(
    destination: Arc<dyn Destination>,
    action: Action,
    local: PathBuf,
    remote: String,
) -> Result<Transfer, DispatchError> {
    let outcome = match action {
        Action::Upload => destination.upload(&local, &remote).await,
        Action::Delete => destination.delete(&remote).await.map(|()| Transfer::Deleted),
    };

    outcome.map_err(|cause| DispatchError::Destination {
        action,
        remote_path: remote,
        cause,
    })
}

fn log_result(path: &Path, result: &DispatchResult) {
    match &result.outcome {
        Ok(Transfer::Unchanged) => debug!(
            path = %path.display(),
            destination = %result.destination,
            remote = %result.remote_path,
            "remote already up to date"
        ),
        Ok(transfer) => info!(
            path = %path.display(),
            destination = %result.destination,
            remote = %result.remote_path,
            ?transfer,
            "{} succeeded",
            result.action
        ),
        Err(err) => warn!(
            path = %path.display(),
            destination = %result.destination,
            error = %err,
            "dispatch failed"
        ),
    }
}
