//! Error taxonomy for collection and selection
//!
//! Corruption and VCS errors carry enough context for the CLI to tell the user
//! whether to re-run collection or to report a tooling bug.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for covet operations.
#[derive(Error, Debug)]
pub enum CovetError {
    // === Run log ===
    /// Bytes at a record offset in the main log are not a valid record.
    #[error("run log {path} is corrupt at byte offset {offset}: {detail}")]
    MainLogCorrupt { path: PathBuf, offset: u64, detail: String },

    /// The companion index file does not parse as JSON.
    #[error("run log index {path} is corrupt: {detail}")]
    IndexCorrupt { path: PathBuf, detail: String },

    /// The main log exists but its index does not.
    #[error("run log index {path} is missing")]
    IndexMissing { path: PathBuf },

    // === VCS ===
    /// The working directory is not inside a repository the provider understands.
    #[error("{path} is not a git repository")]
    VcsNotARepository { path: PathBuf },

    /// The revision does not resolve to a valid object.
    #[error("'{revision}' is not a valid revision reference: {detail}")]
    VcsInvalidRevision { revision: String, detail: String },

    /// No provider is registered under the requested name.
    #[error("unknown VCS '{name}' (available: {available})")]
    UnknownVcs { name: String, available: String },

    // === Collection ===
    #[error("invalid test order policy '{value}', expected random, random_seeded or ordered")]
    InvalidTestOrderPolicy { value: String },

    /// A covered line vanished between two snapshots. Execution counters are
    /// monotonic, so this is a defect in the coverage source.
    #[error("coverage invariant violated: {file}:{line} was executed before but is absent afterwards")]
    InvariantViolation { file: String, line: u32 },

    /// A user-supplied filter predicate failed.
    #[error("collection filter predicate failed for {path}")]
    FilterPredicate {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("invalid pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    // === Selection ===
    #[error("unknown test runner '{name}' (available: {available})")]
    UnknownTestRunner { name: String, available: String },

    #[error("invalid run list format '{value}', expected list, test-runner or json")]
    InvalidFormat { value: String },

    // === Wrapped ===
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CovetError {
    /// Whether the error means the run log has to be collected again.
    pub fn requires_recollection(&self) -> bool {
        matches!(self, Self::MainLogCorrupt { .. } | Self::IndexMissing { .. })
    }

    /// Whether the error points at a bug in the tooling rather than user input.
    pub fn is_tooling_bug(&self) -> bool {
        matches!(self, Self::IndexCorrupt { .. } | Self::InvariantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, CovetError>;
