//! Local path to remote path mapping

use std::path::{Component, Path};

/// Remote path for `local` below `target_root`
///
/// The part of `local` relative to `watch_root` is appended to the target
/// root with `/` separators. A path outside the watch root lands directly
/// under the target root by its base name.
pub fn remote_path_for(local: &Path, watch_root: &Path, target_root: &str) -> String {
    let relative = match local.strip_prefix(watch_root) {
        Ok(rel) => components(rel),
        Err(_) => local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    join(target_root, &relative)
}

fn components(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join(target_root: &str, relative: &str) -> String {
    let root = target_root.trim_end_matches('/');

    match (root.is_empty(), relative.is_empty()) {
        (_, true) => root.to_string(),
        // A bare "/" target stays absolute
        (true, false) if target_root.starts_with('/') => format!("/{}", relative),
        (true, false) => relative.to_string(),
        (false, false) => format!("{}/{}", root, relative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_under_target() {
        let remote = remote_path_for(Path::new("/data/sub/a.txt"), Path::new("/data"), "remote/");
        assert_eq!(remote, "remote/sub/a.txt");

        let remote = remote_path_for(Path::new("/data/sub/a.txt"), Path::new("/data"), "remote");
        assert_eq!(remote, "remote/sub/a.txt");
    }

    #[test]
    fn test_outside_root_falls_back_to_basename() {
        let remote = remote_path_for(Path::new("/elsewhere/x/b.bin"), Path::new("/data"), "backup");
        assert_eq!(remote, "backup/b.bin");
    }

    #[test]
    fn test_root_prefix_is_component_wise() {
        // "/database" is not inside "/data"
        let remote = remote_path_for(Path::new("/database/c.txt"), Path::new("/data"), "r");
        assert_eq!(remote, "r/c.txt");
    }

    #[test]
    fn test_empty_and_absolute_targets() {
        assert_eq!(remote_path_for(Path::new("/data/a"), Path::new("/data"), ""), "a");
        assert_eq!(remote_path_for(Path::new("/data/a/b"), Path::new("/data"), "/"), "/a/b");
        assert_eq!(
            remote_path_for(Path::new("/data/a"), Path::new("/data"), "/srv/mirror//"),
            "/srv/mirror/a"
        );
    }

    #[test]
    fn test_root_itself_maps_to_target() {
        assert_eq!(remote_path_for(Path::new("/data"), Path::new("/data"), "remote/"), "remote");
    }
}
