//! Replay of observer events recorded as JSON lines
//!
//! Each line is one event:
//!
//! ```text
//! {"event": "suite_start", "coverage": {"/app/lib/a.rb": [1, null, 0]}}
//! {"event": "test", "id": "test/a_test.rb#test_one", "before": {..}, "after": {..}, "time": 0.12}
//! {"event": "interrupt"}
//! {"event": "suite_end"}
//! ```
//!
//! A stream that stops before `suite_end` is treated as interrupted.

use crate::collect::session::CollectionSession;
use crate::collect::{CoverageProbe, TestExecutionObserver};
use crate::domain::{RawSnapshot, TestTiming};
use crate::error::Result;
use serde::Deserialize;
use std::io::BufRead;
use std::sync::atomic::Ordering;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
    SuiteStart {
        #[serde(default)]
        coverage: RawSnapshot,
    },
    Test {
        id: String,
        before: RawSnapshot,
        after: RawSnapshot,
        #[serde(default)]
        time: Option<f64>,
    },
    Interrupt,
    SuiteEnd,
}

/// Probe that reports whatever snapshot it was last given.
#[derive(Debug, Default)]
pub struct ReplayProbe {
    current: RawSnapshot,
}

impl ReplayProbe {
    pub fn set(&mut self, snapshot: RawSnapshot) {
        self.current = snapshot;
    }
}

impl CoverageProbe for ReplayProbe {
    fn peek(&mut self) -> Result<RawSnapshot> {
        Ok(self.current.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub tests: usize,
    pub completed: bool,
    /// Whether a run log was written.
    pub written: bool,
}

pub fn replay_events<R: BufRead>(
    input: R,
    session: &mut CollectionSession<ReplayProbe>,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.events += 1;

        match serde_json::from_str::<Event>(line)? {
            Event::SuiteStart { coverage } => {
                session.probe_mut().set(coverage);
                session.on_suite_start()?;
            }
            Event::Test { id, before, after, time } => {
                session.record_test(&id, &before, &after, time.map(TestTiming::from_seconds))?;
                session.probe_mut().set(after);
                summary.tests += 1;
            }
            Event::Interrupt => {
                session.interrupt_handle().store(true, Ordering::SeqCst);
            }
            Event::SuiteEnd => {
                summary.completed = true;
                break;
            }
        }
    }

    if !summary.completed {
        tracing::warn!(events = summary.events, "event stream ended before suite_end");
        session.interrupt_handle().store(true, Ordering::SeqCst);
    }
    summary.written = session.finish()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CollectionFilter, CoverageDiffEngine};
    use crate::domain::{LogRecord, RunOptions, TestOrderPolicy};
    use crate::log::{LogReader, LogWriter};
    use std::path::Path;
    use tempfile::TempDir;

    fn session(dir: &Path) -> CollectionSession<ReplayProbe> {
        let engine = CoverageDiffEngine::new(TestOrderPolicy::Random, CollectionFilter::new());
        let writer = LogWriter::new(dir.join("run_log.json"), dir.join("run_log_index.json"));
        CollectionSession::new(ReplayProbe::default(), engine, writer, RunOptions::default())
    }

    const EVENTS: &str = r#"
{"event":"suite_start","coverage":{"/app/lib/a.rb":[1,null,0,0]}}
{"event":"test","id":"test/a_test.rb#test_one","before":{"/app/lib/a.rb":[1,null,0,0]},"after":{"/app/lib/a.rb":[1,null,2,0]},"time":0.5}
{"event":"test","id":"test/a_test.rb#test_two","before":{"/app/lib/a.rb":[1,null,2,0]},"after":{"/app/lib/a.rb":[1,null,2,1]}}
{"event":"suite_end"}
"#;

    #[test]
    fn replays_a_complete_run() {
        let tmp = TempDir::new().expect("tmp");
        let mut session = session(tmp.path());
        let summary = replay_events(EVENTS.as_bytes(), &mut session).unwrap();

        assert_eq!(summary, ReplaySummary { events: 4, tests: 2, completed: true, written: true });
        let reader =
            LogReader::new(tmp.path().join("run_log.json"), tmp.path().join("run_log_index.json"));
        let records = reader.load_all().unwrap();
        let kinds: Vec<&str> = records.iter().map(LogRecord::kind).collect();
        assert_eq!(kinds, vec!["base", "test", "test", "stats"]);
        match &records[1] {
            LogRecord::TestResult { delta, timing, .. } => {
                assert_eq!(delta.as_ref().unwrap()["/app/lib/a.rb"].get(&3), Some(&2));
                assert_eq!(timing.as_ref().and_then(|t| t.seconds()), Some(0.5));
            }
            other => panic!("expected test result, got {other:?}"),
        }
    }

    #[test]
    fn truncated_stream_is_discarded() {
        let tmp = TempDir::new().expect("tmp");
        let mut session = session(tmp.path());
        let truncated: String = EVENTS.lines().take(3).collect::<Vec<_>>().join("\n");

        let summary = replay_events(truncated.as_bytes(), &mut session).unwrap();
        assert!(!summary.completed);
        assert!(!summary.written);
        assert!(!tmp.path().join("run_log.json").exists());
    }

    #[test]
    fn interrupt_event_prevents_finalizing() {
        let tmp = TempDir::new().expect("tmp");
        let mut session = session(tmp.path());
        let input =
            "{\"event\":\"suite_start\"}\n{\"event\":\"interrupt\"}\n{\"event\":\"suite_end\"}\n";

        let summary = replay_events(input.as_bytes(), &mut session).unwrap();
        assert!(summary.completed);
        assert!(!summary.written);
    }

    #[test]
    fn malformed_event_is_an_error() {
        let tmp = TempDir::new().expect("tmp");
        let mut session = session(tmp.path());
        assert!(replay_events("{\"event\":\"nope\"}\n".as_bytes(), &mut session).is_err());
    }
}
