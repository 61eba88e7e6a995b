//! Local directory mirror
//!
//! Mirrors into a directory on a locally mounted filesystem (NAS share,
//! synced folder, second disk). Files are written through a temp file in the
//! destination directory and renamed into place.

use crate::destination::{Destination, Transfer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cloudsync_core::{fingerprint_file, fingerprint_file_stable};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

const STABLE_READ_ATTEMPTS: u8 = 3;

pub struct LocalDirDestination {
    name: String,
    root: PathBuf,
    transfers: Arc<AtomicU64>,
}

impl LocalDirDestination {
    /// Mirror into `root`, creating it if needed
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create mirror root: {}", root.display()))?;

        Ok(Self {
            name: name.into(),
            root,
            transfers: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of uploads that actually copied content
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    /// Map a remote path into the mirror root
    ///
    /// Leading `/`, empty and `.` segments are dropped; `..` is rejected.
    pub fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in remote.split('/') {
            match segment {
                "" | "." => continue,
                ".." => bail!("Remote path escapes the mirror root: {}", remote),
                part => path.push(part),
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl Destination for LocalDirDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<Transfer> {
        let target = self.resolve(remote)?;
        let local = local.to_path_buf();
        let transfers = Arc::clone(&self.transfers);

        tokio::task::spawn_blocking(move || -> Result<Transfer> {
            let transfer = copy_if_changed(&local, &target)?;
            if transfer.transferred() {
                transfers.fetch_add(1, Ordering::Relaxed);
            }
            Ok(transfer)
        })
        .await
        .context("upload task failed")?
    }

    async fn delete(&self, remote: &str) -> Result<()> {
        let target = self.resolve(remote)?;
        if target == self.root {
            bail!("Refusing to delete the mirror root: {}", self.root.display());
        }

        tokio::task::spawn_blocking(move || remove_entry(&target))
            .await
            .context("delete task failed")?
    }

    async fn create_dir(&self, remote: &str) -> Result<()> {
        let target = self.resolve(remote)?;
        tokio::fs::create_dir_all(&target)
            .await
            .with_context(|| format!("Failed to create directory: {}", target.display()))
    }
}

fn copy_if_changed(local: &Path, target: &Path) -> Result<Transfer> {
    let meta = fs::metadata(local)
        .with_context(|| format!("Failed to stat {}", local.display()))?;

    if meta.is_dir() {
        fs::create_dir_all(target)
            .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        return Ok(Transfer::DirectoryEnsured);
    }

    let source = fingerprint_file_stable(local, STABLE_READ_ATTEMPTS)?;
    if target.is_file() && fingerprint_file(target)? == source {
        trace!(target = %target.display(), fingerprint = %source.short(), "mirror up to date");
        return Ok(Transfer::Unchanged);
    }

    let parent = target
        .parent()
        .with_context(|| format!("Mirror path has no parent: {}", target.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    // Same directory as the target so the final rename stays on one filesystem
    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    let mut reader = BufReader::new(
        File::open(local).with_context(|| format!("Failed to open {}", local.display()))?,
    );
    let bytes = io::copy(&mut reader, &mut staged)
        .with_context(|| format!("Failed to copy {}", local.display()))?;
    staged
        .as_file()
        .sync_all()
        .context("Failed to sync temp file")?;

    staged
        .persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move into place: {}", target.display()))?;

    Ok(Transfer::Uploaded { bytes })
}

fn remove_entry(target: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat {}", target.display()));
        }
    };

    let removed = if meta.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };

    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", target.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, LocalDirDestination) {
        let source = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        let dest = LocalDirDestination::new("nas", mirror.path().join("share")).unwrap();
        (source, mirror, dest)
    }

    #[tokio::test]
    async fn test_upload_copies_into_place() {
        let (source, _mirror, dest) = setup();
        let file = source.path().join("a.txt");
        fs::write(&file, b"hello world").unwrap();

        let transfer = dest.upload(&file, "backup/sub/a.txt").await.unwrap();

        assert_eq!(transfer, Transfer::Uploaded { bytes: 11 });
        let copied = dest.root().join("backup/sub/a.txt");
        assert_eq!(fs::read(copied).unwrap(), b"hello world");
        assert_eq!(dest.transfers(), 1);
    }

    #[tokio::test]
    async fn test_second_upload_is_skipped() {
        let (source, _mirror, dest) = setup();
        let file = source.path().join("a.txt");
        fs::write(&file, b"same").unwrap();

        dest.upload(&file, "a.txt").await.unwrap();
        assert_eq!(dest.upload(&file, "a.txt").await.unwrap(), Transfer::Unchanged);
        assert_eq!(dest.transfers(), 1);

        fs::write(&file, b"different").unwrap();
        assert!(dest.upload(&file, "a.txt").await.unwrap().transferred());
        assert_eq!(fs::read(dest.root().join("a.txt")).unwrap(), b"different");
    }

    #[tokio::test]
    async fn test_directory_upload_and_create_dir() {
        let (source, _mirror, dest) = setup();
        let dir = source.path().join("photos");
        fs::create_dir(&dir).unwrap();

        assert_eq!(dest.upload(&dir, "r/photos").await.unwrap(), Transfer::DirectoryEnsured);
        assert!(dest.root().join("r/photos").is_dir());

        dest.create_dir("r/x/y").await.unwrap();
        dest.create_dir("r/x/y").await.unwrap();
        assert!(dest.root().join("r/x/y").is_dir());
    }

    #[tokio::test]
    async fn test_delete_file_dir_and_absent() {
        let (source, _mirror, dest) = setup();
        let file = source.path().join("a.txt");
        fs::write(&file, b"x").unwrap();
        dest.upload(&file, "r/d/a.txt").await.unwrap();

        dest.delete("r/d/a.txt").await.unwrap();
        assert!(!dest.root().join("r/d/a.txt").exists());

        dest.delete("r/d").await.unwrap();
        assert!(!dest.root().join("r/d").exists());

        dest.delete("r/never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (source, _mirror, dest) = setup();
        let file = source.path().join("a.txt");
        fs::write(&file, b"x").unwrap();

        assert!(dest.upload(&file, "r/../../etc/passwd").await.is_err());
        assert!(dest.delete("..").await.is_err());
        assert!(dest.delete("").await.is_err());
        assert!(dest.root().exists());
    }

    #[test]
    fn test_resolve_normalizes_segments() {
        let (_source, _mirror, dest) = setup();
        assert_eq!(dest.resolve("/a//b/./c").unwrap(), dest.root().join("a/b/c"));
        assert_eq!(dest.resolve("").unwrap(), dest.root());
    }
}
