//! Shared CLI utilities.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{load_config, merge_cli_with_config, CliOverrides};
use crate::domain::Config;
use crate::error::CovetError;
use crate::log::LogReader;
use crate::vcs::find_repository_root;

/// Parse a comma-separated string into a `Vec<String>`, trimming whitespace and
/// discarding empty segments.  Returns `None` when `value` is `None`.
pub fn parse_csv(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
    })
}

/// Repository root and merged configuration for one invocation.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
}

impl Workspace {
    /// Locate the repository root from the current directory and load its
    /// configuration, with `overrides` applied on top.
    pub fn load(config_path: Option<&Path>, overrides: CliOverrides) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        let root = find_repository_root(&cwd, ".git").unwrap_or(cwd);
        let file_config = load_config(&root, config_path)?;
        let config = merge_cli_with_config(file_config, overrides);
        tracing::debug!(root = %root.display(), "workspace");
        Ok(Self { root, config })
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.config.log_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.config.index_file)
    }

    pub fn reader(&self) -> LogReader {
        LogReader::new(self.log_path(), self.index_path())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Attach the action a user should take to run log errors.
pub fn explain(err: CovetError) -> anyhow::Error {
    if err.requires_recollection() {
        anyhow::Error::new(err)
            .context("The run log is damaged; re-run coverage collection to rebuild it")
    } else if err.is_tooling_bug() {
        anyhow::Error::new(err).context("Internal error in covet; please report a bug")
    } else {
        anyhow::Error::new(err)
    }
}
