//! Append-only run log writer
//!
//! Records are buffered in memory and written in batches to a temporary file
//! next to the real log. Only `write_end` moves it into place, so an
//! interrupted run never leaves a half-written log behind.

use crate::domain::LogRecord;
use crate::error::Result;
use crate::log::index::LogIndex;
use crate::log::parent_dir;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_BATCH_SIZE: usize = 100;

pub struct LogWriter {
    path: PathBuf,
    index: LogIndex,
    out: Option<BufWriter<NamedTempFile>>,
    pending: Vec<LogRecord>,
    batch_size: usize,
    position: u64,
    records_written: usize,
    flushes: usize,
    size: usize,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: LogIndex::new(index_path),
            out: None,
            pending: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            position: 0,
            records_written: 0,
            flushes: 0,
            size: 0,
        }
    }

    /// Set how many records are buffered before writing to disk
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches written to the temp file.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Number of records accepted, written or pending.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_started(&self) -> bool {
        self.out.is_some()
    }

    /// Open the temp file and write the opening bracket.
    pub fn write_start(&mut self) -> Result<()> {
        if self.out.is_some() {
            return Ok(());
        }
        let temp = tempfile::Builder::new()
            .prefix(".covet-run-log")
            .suffix(".tmp")
            .tempfile_in(parent_dir(&self.path))?;
        let mut out = BufWriter::new(temp);
        out.write_all(b"[")?;
        self.position = 1;
        self.out = Some(out);
        Ok(())
    }

    pub fn write_record(&mut self, record: LogRecord) -> Result<()> {
        self.pending.push(record);
        self.size += 1;
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write all pending records, indexing each one.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.write_start()?;
        let pending = std::mem::take(&mut self.pending);
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };

        for record in &pending {
            let bytes = serde_json::to_vec(record)?;
            if self.records_written > 0 {
                out.write_all(b",")?;
                self.position += 1;
            }
            out.write_all(&bytes)?;
            self.index.push(self.position, bytes.len() as u64);
            self.position += bytes.len() as u64;
            self.records_written += 1;
        }
        out.flush()?;
        self.flushes += 1;
        tracing::debug!(records = pending.len(), flushes = self.flushes, "flushed run log batch");
        Ok(())
    }

    /// Close the array and move the staged index and log into place.
    ///
    /// Returns `false` without touching the filesystem when nothing was
    /// started or buffered.
    pub fn write_end(&mut self) -> Result<bool> {
        if self.out.is_none() && self.pending.is_empty() {
            return Ok(false);
        }
        self.flush()?;
        self.write_start()?;
        let Some(mut out) = self.out.take() else {
            return Ok(false);
        };
        out.write_all(b"]")?;
        let temp = out.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;

        // Both files are staged before either is renamed. The log is only
        // replaced once its index is in place.
        let index = self.index.stage()?;
        index.persist(self.index.path()).map_err(|e| e.error)?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        tracing::info!(
            path = %self.path.display(),
            records = self.records_written,
            "run log written"
        );
        Ok(true)
    }

    /// Drop everything written so far. The real log path is left untouched.
    pub fn discard(&mut self) {
        let dropped = self.pending.len() + self.records_written;
        self.pending.clear();
        if self.out.take().is_some() {
            tracing::info!(records = dropped, "discarded unfinished run log");
        }
    }
}
