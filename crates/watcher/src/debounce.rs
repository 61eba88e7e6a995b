//! Per-path debouncing
//!
//! Each path owns at most one pending timer. A new notification for a path
//! replaces its timer, so a burst collapses into one [`LogicalEvent`] carrying
//! the kind of the last notification, emitted once the path has been quiet for
//! the whole quiet period.
//!
//! Locking order is always `outlet` then the map shard:
//! - `observe` holds the outlet read lock while it swaps the timer under the
//!   shard lock (the timer task is spawned under that lock too, so it can never
//!   look at the map before its entry is installed)
//! - a firing timer holds the outlet read lock while it removes its own entry
//!   (generation must still match) and sends the event
//! - `shutdown` takes the outlet write lock, which waits out any emission in
//!   progress, drops the sender and aborts the remaining timers

use cloudsync_core::{LogicalEvent, RawChange};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Receiving end of the logical event stream
pub type LogicalEvents = mpsc::UnboundedReceiver<LogicalEvent>;

/// A scheduled emission for one path
struct PendingTimer {
    /// Identifies this timer; a firing timer only emits if it is still current
    generation: u64,
    /// Kind of the latest notification for the path
    kind: cloudsync_core::ChangeKind,
    task: JoinHandle<()>,
}

struct Inner {
    quiet_period: Duration,
    pending: DashMap<PathBuf, PendingTimer>,
    generation: AtomicU64,
    /// None once shut down
    outlet: RwLock<Option<mpsc::UnboundedSender<LogicalEvent>>>,
}

/// Coalesces raw notifications into logical events
///
/// Cheap to clone; all clones share the same pending map and stream.
#[derive(Clone)]
pub struct DebounceEngine {
    inner: Arc<Inner>,
}

impl DebounceEngine {
    /// Create an engine and the stream it emits into
    pub fn new(quiet_period: Duration) -> (Self, LogicalEvents) {
        let (tx, rx) = mpsc::unbounded_channel();

        let engine = Self {
            inner: Arc::new(Inner {
                quiet_period,
                pending: DashMap::new(),
                generation: AtomicU64::new(0),
                outlet: RwLock::new(Some(tx)),
            }),
        };

        (engine, rx)
    }

    /// Record a notification, restarting the path's quiet period
    ///
    /// Must be called from within a Tokio runtime. Ignored after shutdown.
    pub fn observe(&self, change: RawChange) {
        let outlet = self.inner.outlet.read();
        if outlet.is_none() {
            trace!(path = %change.path.display(), "debouncer stopped, dropping notification");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let timer = |path: PathBuf| PendingTimer {
            generation,
            kind: change.kind,
            task: self.spawn_timer(path, generation),
        };

        match self.inner.pending.entry(change.path.clone()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(timer(change.path.clone()));
                previous.task.abort();
                trace!(
                    path = %change.path.display(),
                    from = %previous.kind,
                    to = %change.kind,
                    "restarted quiet period"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(timer(change.path.clone()));
            }
        }
    }

    /// Cancel every pending timer and close the event stream
    ///
    /// Waits for an emission already in progress; after this returns no
    /// further event is emitted. Returns the number of cancelled timers.
    pub fn shutdown(&self) -> usize {
        let mut outlet = self.inner.outlet.write();
        if outlet.take().is_none() {
            return 0;
        }

        let mut cancelled = 0;
        self.inner.pending.retain(|_, timer| {
            timer.task.abort();
            cancelled += 1;
            false
        });

        debug!(cancelled, "debouncer shut down");
        cancelled
    }

    /// Paths with a pending timer
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether `path` has a pending timer
    pub fn is_pending(&self, path: &Path) -> bool {
        self.inner.pending.contains_key(path)
    }

    pub fn quiet_period(&self) -> Duration {
        self.inner.quiet_period
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.outlet.read().is_none()
    }

    fn spawn_timer(&self, path: PathBuf, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_period).await;
            inner.fire(&path, generation);
        })
    }
}

impl Inner {
    fn fire(&self, path: &Path, generation: u64) {
        let outlet = self.outlet.read();
        let Some(tx) = outlet.as_ref() else {
            return;
        };

        // A replaced timer finds a newer generation (or no entry) and stays quiet
        let Some((path, timer)) = self
            .pending
            .remove_if(path, |_, timer| timer.generation == generation)
        else {
            return;
        };

        let event = LogicalEvent::new(path, timer.kind);
        trace!(path = %event.path.display(), kind = %event.kind, "quiet period elapsed");
        if tx.send(event).is_err() {
            trace!("logical event receiver dropped");
        }
    }
}
