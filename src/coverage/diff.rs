//! Per-test coverage deltas against a tracked baseline

use crate::coverage::codec::normalize;
use crate::coverage::filter::CollectionFilter;
use crate::domain::{
    CoverageDelta, CoverageSnapshot, LineCounts, LogRecord, RawSnapshot, RunMetadata,
    TestOrderPolicy,
};
use crate::error::{CovetError, Result};

/// Coverage split for one test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestDelta {
    /// Accrued between the baseline and the test starting; not the test's doing.
    pub before: CoverageDelta,
    /// Executed by the test itself. Empty when nothing new ran.
    pub after: CoverageDelta,
}

impl TestDelta {
    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }
}

/// Element-wise difference `b - a`.
///
/// Lines with an identical count are omitted, lines only in `b` keep their
/// count. A line present in `a` but missing from `b` for a file both contain
/// means counters went backwards, which is reported as an invariant violation.
pub fn diff(a: &CoverageSnapshot, b: &CoverageSnapshot) -> Result<CoverageDelta> {
    let mut delta = CoverageDelta::new();
    for (file, lines_b) in b {
        let lines_a = a.get(file);
        if let Some(lines_a) = lines_a {
            if let Some(line) = lines_a.keys().find(|line| !lines_b.contains_key(line)) {
                return Err(CovetError::InvariantViolation { file: file.clone(), line: *line });
            }
        }

        let changed: LineCounts = lines_b
            .iter()
            .filter_map(|(line, count_b)| match lines_a.and_then(|l| l.get(line)) {
                Some(count_a) if count_a == count_b => None,
                Some(count_a) => Some((*line, count_b - count_a)),
                None => Some((*line, *count_b)),
            })
            .collect();
        if !changed.is_empty() {
            delta.insert(file.clone(), changed);
        }
    }
    Ok(delta)
}

/// Tracks the baseline across a collection run and attributes coverage to tests.
pub struct CoverageDiffEngine {
    baseline: CoverageSnapshot,
    policy: TestOrderPolicy,
    run_index: usize,
    filter: CollectionFilter,
}

impl CoverageDiffEngine {
    pub fn new(policy: TestOrderPolicy, filter: CollectionFilter) -> Self {
        Self { baseline: CoverageSnapshot::new(), policy, run_index: 0, filter }
    }

    pub fn policy(&self) -> TestOrderPolicy {
        self.policy
    }

    pub fn baseline(&self) -> &CoverageSnapshot {
        &self.baseline
    }

    /// Number of tests processed so far.
    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn filter(&self) -> &CollectionFilter {
        &self.filter
    }

    fn prepare(&mut self, raw: &RawSnapshot) -> Result<CoverageSnapshot> {
        self.filter.filter(normalize(raw))
    }

    /// Store the coverage accumulated before the first test as the baseline
    /// and return the `base` record describing it.
    pub fn record_first_run(
        &mut self,
        raw: &RawSnapshot,
        metadata: RunMetadata,
    ) -> Result<LogRecord> {
        let snapshot = self.prepare(raw)?;
        tracing::debug!(files = snapshot.len(), "recorded baseline coverage");
        self.baseline = snapshot.clone();
        Ok(LogRecord::Base { snapshot, metadata })
    }

    /// Compute the deltas for one test bracketed by `before` and `after`.
    pub fn diff_test(&mut self, before: &RawSnapshot, after: &RawSnapshot) -> Result<TestDelta> {
        let before_norm = self.prepare(before)?;
        let before_delta = if self.baseline.is_empty() {
            before_norm.clone()
        } else {
            diff(&self.baseline, &before_norm)?
        };

        let after_norm = self.prepare(after)?;
        let mut after_delta = diff(&before_norm, &after_norm)?;

        if self.run_index > 0 && self.policy.rolls_baseline() {
            self.baseline = after_norm;
        }

        if after_delta == before_delta {
            after_delta.clear();
        }

        self.run_index += 1;
        Ok(TestDelta { before: before_delta, after: after_delta })
    }
}
