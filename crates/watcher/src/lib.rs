//! File system watching for cloudsync
//!
//! This crate provides:
//! - Path eligibility (hidden entries, extra ignore patterns)
//! - A non-recursive watch set that grows as directories appear
//! - Per-path debouncing into logical events
//! - The [`Watcher`] lifecycle tying them together

pub mod debounce;
pub mod error;
pub mod filter;
pub mod source;
pub mod tree;

pub use debounce::{DebounceEngine, LogicalEvents};
pub use error::{NotificationStreamError, WatchSetupError};
pub use filter::{is_hidden, PathFilter};
pub use source::{Notifications, SourceEvent};
pub use tree::{WatchBackend, WatchTree};

use cloudsync_core::{ChangeKind, RawChange};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Watch settings
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// How long a path must stay quiet before its event is emitted
    pub quiet_period: Duration,
    /// Extra gitignore-style patterns relative to the root
    pub ignore: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(3),
            ignore: Vec::new(),
        }
    }
}

/// File system watcher
///
/// Owns the watch tree until [`Watcher::start`] hands it to the watch loop.
pub struct Watcher {
    root: PathBuf,
    debounce: DebounceEngine,
    setup: Option<(WatchTree, Notifications)>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Seed a watch on `root` using the OS notification backend
    ///
    /// The root is canonicalized so event paths and the root share one form.
    /// Returns the watcher and the stream of logical events.
    pub fn new(root: &Path, options: WatchOptions) -> Result<(Self, LogicalEvents), WatchSetupError> {
        let root = root
            .canonicalize()
            .map_err(|_| WatchSetupError::RootMissing(root.to_path_buf()))?;
        let (backend, notifications) = source::os_source()?;
        Self::with_backend(&root, options, backend, notifications)
    }

    /// Seed a watch over an explicit backend and notification stream
    pub fn with_backend(
        root: &Path,
        options: WatchOptions,
        backend: Box<dyn WatchBackend>,
        notifications: Notifications,
    ) -> Result<(Self, LogicalEvents), WatchSetupError> {
        let filter = PathFilter::with_patterns(root, &options.ignore)?;
        let mut tree = WatchTree::new(filter, backend);
        let directories = tree.seed(root)?;

        info!(
            root = %root.display(),
            directories,
            quiet_ms = options.quiet_period.as_millis() as u64,
            "watching"
        );

        let (debounce, events) = DebounceEngine::new(options.quiet_period);

        Ok((
            Self {
                root: root.to_path_buf(),
                debounce,
                setup: Some((tree, notifications)),
                shutdown: None,
                task: None,
            },
            events,
        ))
    }

    /// Start consuming notifications on a background task
    ///
    /// Starting twice is a no-op.
    pub fn start(&mut self) {
        let Some((tree, notifications)) = self.setup.take() else {
            debug!("watcher already started");
            return;
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let debounce = self.debounce.clone();
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(watch_loop(tree, notifications, debounce, shutdown_rx)));
    }

    /// Stop watching
    ///
    /// Pending debounce timers are cancelled first so nothing more is
    /// emitted, then the watch loop exits and the OS watches are released.
    /// Dispatches already running elsewhere are unaffected.
    pub async fn stop(&mut self) {
        let cancelled = self.debounce.shutdown();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "watch loop ended abnormally");
            }
        }
        // Never started: dropping the tree closes the OS watch
        self.setup = None;

        info!(cancelled, "watcher stopped");
    }

    /// Canonical watch root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The debouncer feeding the logical event stream
    pub fn debouncer(&self) -> &DebounceEngine {
        &self.debounce
    }
}

async fn watch_loop(
    mut tree: WatchTree,
    mut notifications: Notifications,
    debounce: DebounceEngine,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            next = notifications.next() => match next {
                Some(SourceEvent::Change(change)) => handle_change(&mut tree, &debounce, change),
                Some(SourceEvent::Error(err)) => warn!(error = %err, "filesystem notification error"),
                None => {
                    debug!("notification stream closed");
                    break;
                }
            },
        }
    }

    debug!(directories = tree.len(), "releasing watches");
}

fn handle_change(tree: &mut WatchTree, debounce: &DebounceEngine, change: RawChange) {
    if change.kind.is_removal() {
        tree.forget(&change.path);
    }

    let is_dir = change.path.is_dir();
    let eligible = if is_dir {
        tree.filter().is_eligible_dir(&change.path)
    } else if change.kind.is_removal() {
        // Gone from disk, so it may have been a directory
        tree.filter().is_eligible(&change.path) && tree.filter().is_eligible_dir(&change.path)
    } else {
        tree.filter().is_eligible(&change.path)
    };
    if !eligible {
        trace!(path = %change.path.display(), "skipping filtered path");
        return;
    }

    debug!(path = %change.path.display(), kind = %change.kind, "change detected");

    let is_new_dir = change.kind == ChangeKind::Create && is_dir;
    let created_dir = change.path.clone();
    debounce.observe(change);

    if is_new_dir {
        match tree.extend_on_create(&created_dir) {
            Ok(added) => backfill(tree.filter(), debounce, &created_dir, &added),
            Err(err) => warn!(path = %created_dir.display(), error = %err, "failed to watch new directory"),
        }
    }
}

/// Feed entries that already exist inside newly watched directories
///
/// Anything written into a directory before its watch was registered never
/// produced a notification of its own.
fn backfill(filter: &PathFilter, debounce: &DebounceEngine, created: &Path, added: &[PathBuf]) {
    for dir in added {
        if dir != created {
            debounce.observe(RawChange::new(dir.clone(), ChangeKind::Create));
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "cannot list new directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_file = entry.file_type().map_or(false, |t| t.is_file());
            if is_file && filter.is_eligible(&path) {
                debounce.observe(RawChange::new(path, ChangeKind::Create));
            }
        }
    }
}
