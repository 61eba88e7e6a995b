//! Destination capability

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// What an upload (or delete) actually did on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Content was written
    Uploaded { bytes: u64 },
    /// Remote content already matched; nothing transferred
    Unchanged,
    /// The local path was a directory; the remote directory now exists
    DirectoryEnsured,
    /// The remote entry is gone (or never existed)
    Deleted,
}

impl Transfer {
    /// Whether bytes actually moved
    pub fn transferred(&self) -> bool {
        matches!(self, Transfer::Uploaded { .. })
    }
}

/// A remote target the watched tree is mirrored into
///
/// Remote paths are `/`-separated strings below the destination's own
/// namespace. Implementations must tolerate concurrent calls for different
/// paths.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Stable identifier, used in logs and results
    fn name(&self) -> &str;

    /// Make the remote content at `remote` match the local path
    ///
    /// Idempotent: unchanged content is not transferred again. A local
    /// directory means "ensure the remote directory exists".
    async fn upload(&self, local: &Path, remote: &str) -> Result<Transfer>;

    /// Remove the remote entry; succeeds if it does not exist
    async fn delete(&self, remote: &str) -> Result<()>;

    /// Ensure the remote directory and its ancestors exist
    async fn create_dir(&self, remote: &str) -> Result<()>;
}
