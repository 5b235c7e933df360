//! One collection run: probe, diff engine and log writer

use crate::collect::{CoverageProbe, TestExecutionObserver};
use crate::coverage::CoverageDiffEngine;
use crate::domain::{LogRecord, RawSnapshot, RunMetadata, RunOptions, RunStats, TestTiming};
use crate::error::Result;
use crate::log::LogWriter;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct CollectionSession<P> {
    probe: P,
    engine: CoverageDiffEngine,
    writer: LogWriter,
    metadata: RunMetadata,
    interrupted: Arc<AtomicBool>,
    started: bool,
    finished: bool,
    started_at: Option<DateTime<Utc>>,
    clock: Option<Instant>,
    tests_run: usize,
    tests_logged: usize,
    tests_skipped: usize,
}

impl<P: CoverageProbe> CollectionSession<P> {
    pub fn new(
        probe: P,
        engine: CoverageDiffEngine,
        writer: LogWriter,
        options: RunOptions,
    ) -> Self {
        Self {
            probe,
            engine,
            writer,
            metadata: RunMetadata::current(options, None),
            interrupted: Arc::new(AtomicBool::new(false)),
            started: false,
            finished: false,
            started_at: None,
            clock: None,
            tests_run: 0,
            tests_logged: 0,
            tests_skipped: 0,
        }
    }

    /// Seed the run was ordered with, recorded in the `base` record.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.metadata.seed = seed;
        self
    }

    /// Flag checked before the log is finalized. Setting it makes
    /// [`finish`](Self::finish) discard the run instead.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    pub fn engine(&self) -> &CoverageDiffEngine {
        &self.engine
    }

    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    pub fn tests_logged(&self) -> usize {
        self.tests_logged
    }

    /// Record `raw` as the load-time baseline. Only the first call has an effect.
    pub fn start_with(&mut self, raw: &RawSnapshot) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.started_at = Some(Utc::now());
        self.clock = Some(Instant::now());

        self.writer.write_start()?;
        let base = self.engine.record_first_run(raw, self.metadata.clone())?;
        self.writer.write_record(base)
    }

    /// Log the coverage one test added between `before` and `after`.
    ///
    /// Tests that executed nothing new are counted but not logged.
    pub fn record_test(
        &mut self,
        test_id: &str,
        before: &RawSnapshot,
        after: &RawSnapshot,
        timing: Option<TestTiming>,
    ) -> Result<()> {
        if !self.started {
            self.start_with(before)?;
        }
        let delta = self.engine.diff_test(before, after)?;
        self.tests_run += 1;

        if delta.is_empty() {
            self.tests_skipped += 1;
            tracing::debug!(test = test_id, "test added no coverage");
            return Ok(());
        }
        self.tests_logged += 1;
        self.writer.write_record(LogRecord::TestResult {
            test_id: test_id.to_string(),
            delta: Some(delta.after),
            timing,
        })
    }

    fn stats(&self) -> RunStats {
        RunStats {
            version: self.metadata.version.clone(),
            tests_run: self.tests_run,
            tests_logged: self.tests_logged,
            tests_skipped: self.tests_skipped,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
            elapsed_seconds: self.clock.map(|c| c.elapsed().as_secs_f64()).unwrap_or_default(),
            filtered: self.engine.filter().report().counts(),
        }
    }

    /// Append the stats record and move the log into place.
    ///
    /// Returns whether a log was written. An interrupted run, or one that
    /// never started, leaves any existing log untouched.
    pub fn finish(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        self.finished = true;

        if self.is_interrupted() {
            tracing::warn!(tests = self.tests_run, "collection interrupted; run log not written");
            self.writer.discard();
            return Ok(false);
        }
        if !self.started {
            return self.writer.write_end();
        }
        self.writer.write_record(LogRecord::Stats(self.stats()))?;
        self.writer.write_end()
    }
}

impl<P: CoverageProbe> TestExecutionObserver for CollectionSession<P> {
    fn on_suite_start(&mut self) -> Result<()> {
        let raw = self.probe.peek()?;
        self.start_with(&raw)
    }

    fn around_test<T, F>(&mut self, test_id: &str, run_test: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        let before = self.probe.peek()?;
        let clock = Instant::now();
        let outcome = run_test();
        let timing = TestTiming::from_duration(clock.elapsed());
        let after = self.probe.peek()?;

        self.record_test(test_id, &before, &after, Some(timing))?;
        Ok(outcome)
    }

    fn on_suite_end(&mut self) -> Result<()> {
        self.finish().map(|_| ())
    }
}
