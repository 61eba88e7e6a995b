//! Change records flowing through the sync pipeline

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Type of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entry created (or renamed into place)
    Create,
    /// File content written
    Write,
    /// Entry deleted
    Remove,
    /// Entry renamed away from this path
    Rename,
}

impl ChangeKind {
    /// Whether this change means the path no longer exists remotely
    ///
    /// `Rename` is the old name of a move: nothing is left at that path, and
    /// the new name arrives as its own `Create`.
    pub fn is_removal(self) -> bool {
        matches!(self, ChangeKind::Remove | ChangeKind::Rename)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Write => "write",
            ChangeKind::Remove => "remove",
            ChangeKind::Rename => "rename",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation from the OS notification layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Absolute path that changed
    pub path: PathBuf,
    /// What happened to it
    pub kind: ChangeKind,
    /// When the notification was observed
    pub observed_at: SystemTime,
}

impl RawChange {
    /// Observation stamped with the current time
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: SystemTime::now(),
        }
    }
}

/// A debounced change, emitted once a path has been quiet for the quiet period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalEvent {
    /// Absolute local path
    pub path: PathBuf,
    /// Kind of the last raw notification seen before the quiet period ended
    pub kind: ChangeKind,
    /// Emission time (not the time of the first raw notification)
    pub emitted_at: SystemTime,
}

impl LogicalEvent {
    /// Event stamped with the current time
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            emitted_at: SystemTime::now(),
        }
    }
}
