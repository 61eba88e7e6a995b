//! Path eligibility for watching and dispatch
//!
//! Two sources of exclusion:
//! 1. Hidden entries (final component starts with `.`) - always enforced
//! 2. Extra gitignore-style patterns from config, relative to the watch root

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Marker that starts the name of a hidden entry
pub const HIDDEN_MARKER: char = '.';

/// Whether the final component of `path` names a hidden entry
///
/// Paths without a final component (`/`, `.`, `..`) are never hidden.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name.to_string_lossy().starts_with(HIDDEN_MARKER))
}

/// Decides which paths the watcher registers and forwards
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Root the extra patterns are anchored at
    root: PathBuf,

    /// Compiled extra patterns (None when none are configured)
    patterns: Option<Gitignore>,
}

impl PathFilter {
    /// Filter that only excludes hidden entries
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: None,
        }
    }

    /// Filter with extra gitignore-style patterns
    pub fn with_patterns<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        patterns: &[S],
    ) -> Result<Self, ignore::Error> {
        let root = root.into();
        if patterns.is_empty() {
            return Ok(Self::new(root));
        }

        let mut builder = GitignoreBuilder::new(&root);
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref())?;
        }

        Ok(Self {
            patterns: Some(builder.build()?),
            root,
        })
    }

    /// Whether a file (or any path of unknown type) is eligible
    pub fn is_eligible(&self, path: &Path) -> bool {
        !is_hidden(path) && !self.matches_pattern(path, false)
    }

    /// Whether a directory is eligible to be watched and descended into
    pub fn is_eligible_dir(&self, path: &Path) -> bool {
        !is_hidden(path) && !self.matches_pattern(path, true)
    }

    /// Root the extra patterns are anchored at
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of configured extra patterns
    pub fn pattern_count(&self) -> usize {
        self.patterns.as_ref().map_or(0, |gi| gi.num_ignores() as usize)
    }

    fn matches_pattern(&self, path: &Path, is_dir: bool) -> bool {
        let Some(patterns) = &self.patterns else {
            return false;
        };

        // Patterns only apply inside the root; anything else is left to the
        // hidden-entry rule
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return false,
            }
        } else {
            path
        };

        if relative.as_os_str().is_empty() {
            return false;
        }

        patterns
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}
