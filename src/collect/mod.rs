//! Coverage collection around test executions
//!
//! A test framework binding drives a [`TestExecutionObserver`]; the
//! [`CollectionSession`] reads counters through a [`CoverageProbe`], turns
//! them into per-test deltas and appends them to the run log.

use crate::domain::RawSnapshot;
use crate::error::Result;

pub mod events;
pub mod session;

pub use events::{replay_events, ReplayProbe, ReplaySummary};
pub use session::CollectionSession;

/// Source of raw line counters.
pub trait CoverageProbe {
    /// Counters for every loaded file since tracking started.
    ///
    /// Must not reset the counters; it is called twice per test.
    fn peek(&mut self) -> Result<RawSnapshot>;
}

/// Hooks a test framework calls while running a suite.
pub trait TestExecutionObserver {
    /// Called once before the first test.
    fn on_suite_start(&mut self) -> Result<()>;

    /// Run one test, recording the coverage it adds.
    fn around_test<T, F>(&mut self, test_id: &str, run_test: F) -> Result<T>
    where
        F: FnOnce() -> T;

    /// Called once after the last test.
    fn on_suite_end(&mut self) -> Result<()>;
}
