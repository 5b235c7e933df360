//! Git change extraction

use crate::domain::{LineChange, LineChanges};
use crate::error::{CovetError, Result};
use crate::utils::normalize_path;
use crate::vcs::{find_repository_root, Revision, VcsProvider};
use git2::{DiffDelta, DiffOptions, ErrorCode, Repository, Tree};
use std::path::PathBuf;

const DEFAULT_CONTEXT_LINES: u32 = 3;

#[derive(Debug, Clone)]
pub struct GitProvider {
    workdir: PathBuf,
    context_lines: u32,
}

impl GitProvider {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into(), context_lines: DEFAULT_CONTEXT_LINES }
    }

    /// Number of unchanged lines reported around each change
    pub fn context_lines(mut self, lines: u32) -> Self {
        self.context_lines = lines;
        self
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.workdir).map_err(|e| match e.code() {
            ErrorCode::NotFound => CovetError::VcsNotARepository { path: self.workdir.clone() },
            _ => CovetError::Git(e),
        })
    }
}

fn revision_tree<'r>(repo: &'r Repository, revision: &Revision) -> Result<Option<Tree<'r>>> {
    match revision {
        Revision::LastCommit => match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            // No commits yet: everything in the index is new.
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        },
        Revision::Reference(reference) => {
            let commit = repo
                .revparse_single(reference)
                .and_then(|object| object.peel_to_commit())
                .map_err(|e| CovetError::VcsInvalidRevision {
                    revision: reference.clone(),
                    detail: e.message().to_string(),
                })?;
            tracing::debug!(revision = %reference, commit = %commit.id(), "resolved revision");
            Ok(Some(commit.tree()?))
        }
    }
}

/// Line number a diff line contributes: additions and context lines use the
/// new numbering, deletions the old one.
pub fn changed_line_number(
    origin: char,
    old_lineno: Option<u32>,
    new_lineno: Option<u32>,
) -> Option<u32> {
    match origin {
        '+' | ' ' => new_lineno,
        '-' => old_lineno,
        _ => None,
    }
}

fn delta_path(delta: &DiffDelta<'_>) -> Option<String> {
    delta
        .old_file()
        .path()
        .or_else(|| delta.new_file().path())
        .map(|p| normalize_path(&p.to_string_lossy()))
}

impl VcsProvider for GitProvider {
    fn name(&self) -> &'static str {
        "git"
    }

    fn changes_since(&self, revision: &Revision) -> Result<LineChanges> {
        let repo = self.open()?;
        let tree = revision_tree(&repo, revision)?;

        let mut opts = DiffOptions::new();
        opts.ignore_whitespace(true).ignore_filemode(true).context_lines(self.context_lines);
        let diff = repo.diff_tree_to_workdir_with_index(tree.as_ref(), Some(&mut opts))?;

        let mut changes = LineChanges::new();
        diff.foreach(
            &mut |_, _| true,
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                let number =
                    changed_line_number(line.origin(), line.old_lineno(), line.new_lineno());
                if let (Some(file), Some(number)) = (delta_path(&delta), number) {
                    changes.insert(LineChange::new(file, number));
                }
                true
            }),
        )?;

        tracing::debug!(revision = %revision, lines = changes.len(), "collected line changes");
        Ok(changes)
    }

    fn repository_root(&self) -> Option<PathBuf> {
        find_repository_root(&self.workdir, ".git")
    }
}
