//! Random-access index for the run log
//!
//! Stored as a JSON array of `[byte_offset, byte_length]` pairs, one per
//! record, in write order.

use crate::error::{CovetError, Result};
use crate::log::{persist_atomically, stage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct IndexEntry {
    pub offset: u64,
    pub length: u64,
}

impl From<(u64, u64)> for IndexEntry {
    fn from((offset, length): (u64, u64)) -> Self {
        Self { offset, length }
    }
}

impl From<IndexEntry> for (u64, u64) {
    fn from(entry: IndexEntry) -> Self {
        (entry.offset, entry.length)
    }
}

#[derive(Debug, Clone)]
pub struct LogIndex {
    path: PathBuf,
    entries: Vec<IndexEntry>,
}

impl LogIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: Vec::new() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CovetError::IndexMissing { path: path.to_path_buf() },
            _ => e.into(),
        })?;
        let entries = serde_json::from_slice(&bytes).map_err(|e| CovetError::IndexCorrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(Self { path: path.to_path_buf(), entries })
    }

    pub fn push(&mut self, offset: u64, length: u64) {
        self.entries.push(IndexEntry { offset, length });
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a possibly negative position (counting from the end).
    pub fn get(&self, position: isize) -> Option<IndexEntry> {
        let idx = if position < 0 {
            self.entries.len().checked_sub(position.unsigned_abs())?
        } else {
            position as usize
        };
        self.entries.get(idx).copied()
    }

    pub fn store(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.entries)?;
        persist_atomically(&self.path, &bytes)
    }

    /// Serialize into a temp file beside the index, ready to be persisted.
    pub(crate) fn stage(&self) -> Result<NamedTempFile> {
        let bytes = serde_json::to_vec(&self.entries)?;
        stage(&self.path, &bytes)
    }
}
