//! Sequential and random-access reads of the run log

use crate::domain::LogRecord;
use crate::error::{CovetError, Result};
use crate::log::index::{IndexEntry, LogIndex};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LogReader {
    log_path: PathBuf,
    index_path: PathBuf,
}

impl LogReader {
    pub fn new(log_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self { log_path: log_path.into(), index_path: index_path.into() }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn exists(&self) -> bool {
        self.log_path.is_file()
    }

    pub fn index(&self) -> Result<LogIndex> {
        LogIndex::load(&self.index_path)
    }

    /// Lazily read every record in write order. Call again to restart.
    pub fn records(&self) -> Result<Records> {
        let index = self.index()?;
        let file = File::open(&self.log_path)?;
        let len = file.metadata()?.len();
        Ok(Records {
            path: self.log_path.clone(),
            file,
            len,
            entries: index.entries().to_vec().into_iter(),
        })
    }

    /// Read one record by position; negative positions count from the end.
    pub fn load_record(&self, position: isize) -> Result<Option<LogRecord>> {
        let index = self.index()?;
        let Some(entry) = index.get(position) else {
            return Ok(None);
        };
        let mut file = File::open(&self.log_path)?;
        let len = file.metadata()?.len();
        read_entry(&mut file, len, &self.log_path, entry).map(Some)
    }

    /// Parse the whole log at once.
    pub fn load_all(&self) -> Result<Vec<LogRecord>> {
        let bytes = fs::read(&self.log_path)?;
        serde_json::from_slice(&bytes).map_err(|e| CovetError::MainLogCorrupt {
            path: self.log_path.clone(),
            offset: 0,
            detail: e.to_string(),
        })
    }
}

pub struct Records {
    path: PathBuf,
    file: File,
    len: u64,
    entries: std::vec::IntoIter<IndexEntry>,
}

impl Iterator for Records {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        Some(read_entry(&mut self.file, self.len, &self.path, entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

fn read_entry(file: &mut File, len: u64, path: &Path, entry: IndexEntry) -> Result<LogRecord> {
    let corrupt = |detail: String| CovetError::MainLogCorrupt {
        path: path.to_path_buf(),
        offset: entry.offset,
        detail,
    };

    // Bounds come from the index; never allocate past the end of the log.
    match entry.offset.checked_add(entry.length) {
        Some(end) if end <= len => {}
        _ => {
            return Err(corrupt(format!(
                "record of {} bytes runs past the end of the {len} byte log",
                entry.length
            )))
        }
    }

    file.seek(SeekFrom::Start(entry.offset))?;
    let mut buf = vec![0u8; entry.length as usize];
    if let Err(e) = file.read_exact(&mut buf) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Err(corrupt(format!("expected {} bytes, log is truncated", entry.length)));
        }
        return Err(e.into());
    }

    // Separator left over from the writer.
    while matches!(buf.last(), Some(b',' | b' ' | b'\n' | b'\r' | b'\t')) {
        buf.pop();
    }

    let value: Value = serde_json::from_slice(&buf).map_err(|e| corrupt(e.to_string()))?;
    LogRecord::from_value(value).map_err(corrupt)
}
