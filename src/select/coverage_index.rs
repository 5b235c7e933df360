//! In-memory `file -> line -> tests` map rebuilt from the run log

use crate::domain::{CoverageDelta, LogRecord, RunMetadata, RunStats, BASE_TEST_ID};
use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct CoverageIndex {
    files: HashMap<String, BTreeMap<u32, BTreeSet<String>>>,
    metadata: Option<RunMetadata>,
    stats: Option<RunStats>,
    tests: usize,
}

impl CoverageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay log records in order. Test results without coverage are skipped.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<LogRecord>>,
    {
        let mut index = Self::new();
        for record in records {
            match record? {
                LogRecord::Base { snapshot, metadata } => {
                    if !metadata.is_current_version() {
                        tracing::warn!(
                            logged = %metadata.version,
                            running = env!("CARGO_PKG_VERSION"),
                            "run log was collected by a different version; results may be inaccurate"
                        );
                    }
                    index.add_coverage(BASE_TEST_ID, &snapshot);
                    index.metadata = Some(metadata);
                }
                LogRecord::TestResult { test_id, delta: Some(delta), .. } if !delta.is_empty() => {
                    index.add_coverage(&test_id, &delta);
                    index.tests += 1;
                }
                LogRecord::TestResult { .. } => {}
                LogRecord::Stats(stats) => index.stats = Some(stats),
            }
        }
        tracing::debug!(files = index.files.len(), tests = index.tests, "rebuilt coverage index");
        Ok(index)
    }

    /// Attribute every executed line in `coverage` to `test_id`.
    pub fn add_coverage(&mut self, test_id: &str, coverage: &CoverageDelta) {
        for (file, lines) in coverage {
            for (line, count) in lines {
                if *count > 0 {
                    self.insert(file, *line, test_id);
                }
            }
        }
    }

    pub fn insert(&mut self, file: &str, line: u32, test_id: &str) {
        self.files
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_default()
            .insert(test_id.to_string());
    }

    pub fn contains_file(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    pub fn tests_for(&self, file: &str, line: u32) -> impl Iterator<Item = &str> {
        self.files
            .get(file)
            .and_then(|lines| lines.get(&line))
            .into_iter()
            .flat_map(|tests| tests.iter().map(String::as_str))
    }

    pub fn metadata(&self) -> Option<&RunMetadata> {
        self.metadata.as_ref()
    }

    pub fn stats(&self) -> Option<&RunStats> {
        self.stats.as_ref()
    }

    /// Number of test results that contributed coverage.
    pub fn test_count(&self) -> usize {
        self.tests
    }
}
