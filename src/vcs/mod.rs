//! Changed-line extraction from version control
//!
//! Providers are looked up by name in a [`VcsRegistry`] once at startup.

use crate::domain::{Config, LineChanges};
use crate::error::{CovetError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod git;

pub use git::GitProvider;

/// Point in history to compare the working state against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Revision {
    /// The current commit (`last_commit` or `HEAD`).
    #[default]
    LastCommit,
    /// Any other reference: branch, tag or object id.
    Reference(String),
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "last_commit" | "HEAD" => Self::LastCommit,
            other => Self::Reference(other.to_string()),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastCommit => f.write_str("last_commit"),
            Self::Reference(reference) => f.write_str(reference),
        }
    }
}

pub trait VcsProvider {
    fn name(&self) -> &'static str;

    /// Lines (repository-relative file, 1-based line) that differ between the
    /// working state and `revision`.
    fn changes_since(&self, revision: &Revision) -> Result<LineChanges>;

    /// Root of the repository containing the working directory.
    fn repository_root(&self) -> Option<PathBuf>;
}

/// Walk up from `start` looking for a `marker` directory such as `.git`.
pub fn find_repository_root(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(marker).exists() {
            return Some(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

pub type ProviderFactory = fn(&Path, &Config) -> Box<dyn VcsProvider>;

pub struct VcsRegistry {
    providers: BTreeMap<&'static str, ProviderFactory>,
}

impl Default for VcsRegistry {
    fn default() -> Self {
        let mut registry = Self { providers: BTreeMap::new() };
        registry.register("git", |workdir, config| {
            Box::new(GitProvider::new(workdir).context_lines(config.context_lines))
        });
        registry
    }
}

impl VcsRegistry {
    pub fn register(&mut self, name: &'static str, factory: ProviderFactory) {
        self.providers.insert(name, factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    pub fn resolve(
        &self,
        name: &str,
        workdir: &Path,
        config: &Config,
    ) -> Result<Box<dyn VcsProvider>> {
        let factory = self.providers.get(name).ok_or_else(|| CovetError::UnknownVcs {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;
        Ok(factory(workdir, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn revision_aliases_map_to_last_commit() {
        assert_eq!(Revision::from("HEAD"), Revision::LastCommit);
        assert_eq!(Revision::from("last_commit"), Revision::LastCommit);
        assert_eq!(Revision::from("main~2"), Revision::Reference("main~2".to_string()));
    }

    #[test]
    fn find_repository_root_returns_ancestor_with_git() {
        let temp = TempDir::new().expect("tmp");
        let root = temp.path();
        fs::create_dir(root.join(".git")).expect("mkdir .git");
        let subdir = root.join("lib").join("deep");
        fs::create_dir_all(&subdir).expect("mkdir subdir");

        assert_eq!(find_repository_root(&subdir, ".git").as_deref(), Some(root));
    }

    #[test]
    fn find_repository_root_is_none_without_marker() {
        let temp = TempDir::new().expect("tmp");
        let dir = temp.path().join("project");
        fs::create_dir_all(&dir).expect("mkdir");

        assert!(find_repository_root(&dir, ".covet-test-marker-that-does-not-exist").is_none());
    }

    #[test]
    fn registry_resolves_git_and_rejects_unknown() {
        let registry = VcsRegistry::default();
        let provider = registry.resolve("git", Path::new("."), &Config::default()).unwrap();
        assert_eq!(provider.name(), "git");

        let err =
            registry.resolve("hg", Path::new("."), &Config::default()).err().expect("unknown");
        assert!(matches!(err, CovetError::UnknownVcs { ref available, .. } if available == "git"));
    }
}
