//! Watch set management
//!
//! The tree owns the set of watched directories and the OS watch handle.
//! Every directory is registered non-recursively so that hidden or ignored
//! subtrees are never observed. Removed directories leave the set so a
//! directory recreated under the same name is registered again.

use crate::error::WatchSetupError;
use crate::filter::PathFilter;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Something that can add one more directory to an active watch
pub trait WatchBackend: Send {
    /// Start receiving notifications for the direct children of `dir`
    fn add(&mut self, dir: &Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn add(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Owned set of watched directories
pub struct WatchTree {
    filter: PathFilter,
    backend: Box<dyn WatchBackend>,
    watched: HashSet<PathBuf>,
}

impl WatchTree {
    /// Create an empty tree over the given backend
    pub fn new(filter: PathFilter, backend: Box<dyn WatchBackend>) -> Self {
        Self {
            filter,
            backend,
            watched: HashSet::new(),
        }
    }

    /// Register `root` and every eligible directory below it
    ///
    /// Ineligible directories are skipped together with their whole subtree.
    /// Returns the number of newly registered directories.
    pub fn seed(&mut self, root: &Path) -> Result<usize, WatchSetupError> {
        if !root.exists() {
            return Err(WatchSetupError::RootMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(WatchSetupError::NotADirectory(root.to_path_buf()));
        }
        if !self.filter.is_eligible_dir(root) {
            return Err(WatchSetupError::RootExcluded(root.to_path_buf()));
        }

        let added = self.register_subtree(root)?;
        debug!(root = %root.display(), directories = added.len(), "seeded watch tree");
        Ok(added.len())
    }

    /// Extend coverage to a directory that just appeared
    ///
    /// Registers the directory and any eligible subdirectories it already
    /// contains (a tree moved into place arrives as a single create).
    /// Already-watched directories are skipped, so calling this twice is a
    /// no-op. Returns the directories that were newly registered.
    pub fn extend_on_create(&mut self, path: &Path) -> Result<Vec<PathBuf>, WatchSetupError> {
        if !self.filter.is_eligible_dir(path) {
            trace!(path = %path.display(), "not extending watch to filtered directory");
            return Ok(Vec::new());
        }

        let added = self.register_subtree(path)?;
        for dir in &added {
            debug!(path = %dir.display(), "watching new directory");
        }
        Ok(added)
    }

    /// Drop `path` and every watched directory below it
    ///
    /// Called when a path is removed or renamed away. The OS drops the watch
    /// of a deleted directory, so a directory later created under the same
    /// name has to be registered again. Returns the number forgotten.
    pub fn forget(&mut self, path: &Path) -> usize {
        let before = self.watched.len();
        self.watched.retain(|dir| !dir.starts_with(path));
        let forgotten = before - self.watched.len();
        if forgotten > 0 {
            debug!(path = %path.display(), forgotten, "directory left the watch set");
        }
        forgotten
    }

    /// Whether `dir` is currently watched
    pub fn contains(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// Number of watched directories
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Watched directories (unordered)
    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }

    /// The filter deciding what gets watched
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    fn register_subtree(&mut self, top: &Path) -> Result<Vec<PathBuf>, WatchSetupError> {
        let mut added = Vec::new();
        let filter = &self.filter;

        let walker = WalkDir::new(top)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || filter.is_eligible_dir(e.path()));

        for entry in walker {
            let entry = entry.map_err(|source| WatchSetupError::Walk {
                path: source.path().unwrap_or(top).to_path_buf(),
                source,
            })?;

            if !entry.file_type().is_dir() || self.watched.contains(entry.path()) {
                continue;
            }

            self.backend
                .add(entry.path())
                .map_err(|source| WatchSetupError::Register {
                    path: entry.path().to_path_buf(),
                    source,
                })?;

            self.watched.insert(entry.path().to_path_buf());
            added.push(entry.path().to_path_buf());
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Records registrations; optionally refuses one directory name
    #[derive(Clone, Default)]
    struct RecordingBackend {
        added: Arc<Mutex<Vec<PathBuf>>>,
        refuse: Option<String>,
    }

    impl WatchBackend for RecordingBackend {
        fn add(&mut self, dir: &Path) -> notify::Result<()> {
            if let Some(name) = &self.refuse {
                if dir.ends_with(name) {
                    return Err(notify::Error::generic("watch limit reached"));
                }
            }
            self.added.lock().push(dir.to_path_buf());
            Ok(())
        }
    }

    // TempDir's default names start with '.', which would make the root hidden
    fn sandbox() -> TempDir {
        tempfile::Builder::new().prefix("watch-tree").tempdir().unwrap()
    }

    fn tree_with(backend: RecordingBackend, root: &Path) -> WatchTree {
        WatchTree::new(PathFilter::new(root), Box::new(backend))
    }

    #[test]
    fn test_seed_registers_visible_directories() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("a/file.txt"), b"x").unwrap();

        let backend = RecordingBackend::default();
        let mut tree = tree_with(backend.clone(), root);

        assert_eq!(tree.seed(root).unwrap(), 4);
        assert!(tree.contains(root));
        assert!(tree.contains(&root.join("a")));
        assert!(tree.contains(&root.join("a/b")));
        assert!(tree.contains(&root.join("c")));
        assert!(!tree.contains(&root.join("a/file.txt")));
        assert_eq!(backend.added.lock().len(), 4);
    }

    #[test]
    fn test_seed_skips_hidden_subtrees() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git/objects/ab")).unwrap();
        fs::create_dir_all(root.join("src/.cache/deep")).unwrap();

        let backend = RecordingBackend::default();
        let mut tree = tree_with(backend.clone(), root);
        tree.seed(root).unwrap();

        assert!(tree.contains(&root.join("src")));
        assert_eq!(tree.len(), 2);
        for dir in backend.added.lock().iter() {
            assert!(!dir.to_string_lossy().contains("/.git"));
            assert!(!dir.to_string_lossy().contains("/.cache"));
        }
    }

    #[test]
    fn test_seed_respects_extra_patterns() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("build/nested")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();

        let filter = PathFilter::with_patterns(root, &["build/"]).unwrap();
        let mut tree = WatchTree::new(filter, Box::new(RecordingBackend::default()));
        tree.seed(root).unwrap();

        assert!(tree.contains(&root.join("docs")));
        assert!(!tree.contains(&root.join("build")));
        assert!(!tree.contains(&root.join("build/nested")));
    }

    #[test]
    fn test_seed_missing_root() {
        let temp_dir = sandbox();
        let missing = temp_dir.path().join("gone");
        let mut tree = tree_with(RecordingBackend::default(), temp_dir.path());

        assert!(matches!(tree.seed(&missing), Err(WatchSetupError::RootMissing(_))));
    }

    #[test]
    fn test_seed_root_is_file() {
        let temp_dir = sandbox();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        let mut tree = tree_with(RecordingBackend::default(), temp_dir.path());

        assert!(matches!(tree.seed(&file), Err(WatchSetupError::NotADirectory(_))));
    }

    #[test]
    fn test_seed_hidden_root_is_rejected() {
        let temp_dir = sandbox();
        let hidden = temp_dir.path().join(".outbox");
        fs::create_dir(&hidden).unwrap();
        let mut tree = tree_with(RecordingBackend::default(), &hidden);

        assert!(matches!(tree.seed(&hidden), Err(WatchSetupError::RootExcluded(_))));
    }

    #[test]
    fn test_seed_fails_when_registration_refused() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("ok")).unwrap();
        fs::create_dir_all(root.join("refused")).unwrap();

        let backend = RecordingBackend {
            refuse: Some("refused".to_string()),
            ..Default::default()
        };
        let mut tree = tree_with(backend, root);

        match tree.seed(root) {
            Err(WatchSetupError::Register { path, .. }) => assert!(path.ends_with("refused")),
            other => panic!("expected registration failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_extend_on_create_is_idempotent() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        let backend = RecordingBackend::default();
        let mut tree = tree_with(backend.clone(), root);
        tree.seed(root).unwrap();

        fs::create_dir_all(root.join("incoming/nested")).unwrap();

        let added = tree.extend_on_create(&root.join("incoming")).unwrap();
        assert_eq!(added, vec![root.join("incoming"), root.join("incoming/nested")]);

        let again = tree.extend_on_create(&root.join("incoming")).unwrap();
        assert!(again.is_empty());
        assert_eq!(backend.added.lock().len(), 3);
    }

    #[test]
    fn test_forget_allows_reregistration() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("sub/inner")).unwrap();
        fs::create_dir_all(root.join("subway")).unwrap();

        let backend = RecordingBackend::default();
        let mut tree = tree_with(backend.clone(), root);
        tree.seed(root).unwrap();
        assert_eq!(tree.len(), 4);

        fs::remove_dir_all(root.join("sub")).unwrap();
        assert_eq!(tree.forget(&root.join("sub")), 2);
        assert!(!tree.contains(&root.join("sub/inner")));
        // Component-wise prefix: "subway" is not below "sub"
        assert!(tree.contains(&root.join("subway")));

        fs::create_dir(root.join("sub")).unwrap();
        assert_eq!(tree.extend_on_create(&root.join("sub")).unwrap(), vec![root.join("sub")]);
        assert_eq!(backend.added.lock().iter().filter(|d| d.ends_with("sub")).count(), 2);

        assert_eq!(tree.forget(&root.join("never-watched")), 0);
    }

    #[test]
    fn test_extend_on_create_ignores_hidden() {
        let temp_dir = sandbox();
        let root = temp_dir.path();
        let mut tree = tree_with(RecordingBackend::default(), root);
        tree.seed(root).unwrap();

        fs::create_dir(root.join(".trash")).unwrap();
        assert!(tree.extend_on_create(&root.join(".trash")).unwrap().is_empty());
        assert!(!tree.contains(&root.join(".trash")));
    }
}
