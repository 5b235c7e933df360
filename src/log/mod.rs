//! Chunked, crash-safe run log
//!
//! The log is a single JSON array with one element per record. A companion
//! index keeps the byte range of every record so the log can be replayed or
//! randomly accessed without loading it whole.

use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub mod index;
pub mod reader;
pub mod writer;

pub use index::{IndexEntry, LogIndex};
pub use reader::{LogReader, Records};
pub use writer::LogWriter;

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `bytes` to a synced temp file next to `path`.
pub(crate) fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix(".covet")
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    stage(path, bytes)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}
