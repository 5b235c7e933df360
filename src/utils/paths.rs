//! Path normalization

use std::path::Path;

pub fn normalize_path(path: &str) -> String {
    // Convert backslashes to forward slashes and normalize
    path.replace('\\', "/")
}

/// Absolute path string for a repository-relative path.
pub fn absolute_in(root: &Path, relative: &str) -> String {
    if Path::new(relative).is_absolute() {
        return normalize_path(relative);
    }
    normalize_path(&root.join(relative).to_string_lossy())
}

/// Repository-relative form of `path`, if it lies under `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|rel| normalize_path(&rel.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_in_joins_relative_paths() {
        assert_eq!(absolute_in(Path::new("/repo"), "lib/a.rb"), "/repo/lib/a.rb");
        assert_eq!(absolute_in(Path::new("/repo"), "/elsewhere/b.rb"), "/elsewhere/b.rb");
    }

    #[test]
    fn relative_to_requires_prefix() {
        assert_eq!(
            relative_to(Path::new("/repo"), Path::new("/repo/test/a_test.rb")).as_deref(),
            Some("test/a_test.rb")
        );
        assert!(relative_to(Path::new("/repo"), Path::new("/other/a.rb")).is_none());
    }
}
