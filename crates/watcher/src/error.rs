//! Watcher error types

use std::path::PathBuf;
use thiserror::Error;

/// Failure to establish (or extend) the watch set
///
/// Fatal when it happens while seeding the root; while extending on a
/// directory create it is logged and the pipeline keeps running.
#[derive(Debug, Error)]
pub enum WatchSetupError {
    #[error("watch root {} does not exist", .0.display())]
    RootMissing(PathBuf),

    #[error("watch root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("watch root {} is excluded by the path filter", .0.display())]
    RootExcluded(PathBuf),

    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] ignore::Error),

    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to create the OS watcher: {0}")]
    Backend(#[source] notify::Error),

    #[error("failed to watch {}: {source}", .path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Error reported asynchronously by the OS notification layer
///
/// Nothing is re-registered automatically; the watch loop logs it and moves on.
#[derive(Debug, Error)]
#[error("filesystem notification error{}: {source}", describe_paths(.paths))]
pub struct NotificationStreamError {
    /// Paths the OS attached to the error, if any
    pub paths: Vec<PathBuf>,
    #[source]
    pub source: notify::Error,
}

impl From<notify::Error> for NotificationStreamError {
    fn from(source: notify::Error) -> Self {
        Self {
            paths: source.paths.clone(),
            source,
        }
    }
}

fn describe_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        String::new()
    } else {
        let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        format!(" on {}", joined.join(", "))
    }
}
