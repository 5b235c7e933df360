//! Test selection
//!
//! Changed lines come from a [`VcsProvider`], the run log is replayed into a
//! [`CoverageIndex`], and the [`RunListResolver`] decides what has to run.

use crate::domain::LineChange;
use crate::error::Result;
use crate::log::LogReader;
use crate::vcs::{Revision, VcsProvider};
use std::path::{Path, PathBuf};

pub mod coverage_index;
pub mod render;
pub mod resolver;
pub mod runner;

pub use coverage_index::CoverageIndex;
pub use render::{render, OutputFormat};
pub use resolver::{Resolution, RunList, RunListResolver, TestFileMatcher};
pub use runner::{shell_quote, Minitest, Rspec, RunnerRegistry, TestRunnerAdapter};

/// Outcome of a selection. Every variant is a normal result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Nothing differs from the revision.
    NoChanges { revision: Revision },
    /// No run log has been collected yet.
    MissingLog { path: PathBuf },
    /// Load-time code changed, so every test file runs.
    AllTestFiles { test_files: Vec<String>, load_time_changes: Vec<LineChange> },
    RunList(RunList),
}

impl Selection {
    /// Whether there is anything to run.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::NoChanges { .. } | Self::MissingLog { .. } => true,
            Self::AllTestFiles { test_files, .. } => test_files.is_empty(),
            Self::RunList(list) => list.is_empty(),
        }
    }
}

/// Decide which tests cover the lines changed since `revision`.
///
/// The log is only opened when there are changes to look up.
pub fn select_tests(
    vcs: &dyn VcsProvider,
    revision: &Revision,
    reader: &LogReader,
    matcher: &TestFileMatcher,
    root: &Path,
) -> Result<Selection> {
    let changes = vcs.changes_since(revision)?;
    if changes.is_empty() {
        tracing::info!(revision = %revision, "no changes");
        return Ok(Selection::NoChanges { revision: revision.clone() });
    }
    tracing::debug!(lines = changes.len(), provider = vcs.name(), "changed lines");

    if !reader.exists() {
        return Ok(Selection::MissingLog { path: reader.log_path().to_path_buf() });
    }

    let index = CoverageIndex::from_records(reader.records()?)?;
    let selection = match RunListResolver::new(&index, matcher, root).resolve(&changes) {
        Resolution::AllTestFiles { load_time_changes } => {
            Selection::AllTestFiles { test_files: matcher.enumerate(root), load_time_changes }
        }
        Resolution::RunList(list) => Selection::RunList(list),
    };
    Ok(selection)
}
