//! Core domain types for coverage collection and test selection

use crate::error::CovetError;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Per-line execution counts keyed by 1-based line number.
pub type LineCounts = BTreeMap<u32, i64>;

/// Raw probe output: every loaded file with its full per-line counter array.
/// `None` marks lines that are not executable.
pub type RawSnapshot = BTreeMap<String, Vec<Option<u64>>>;

/// Normalized snapshot: file -> {line -> count}, zero counts omitted.
pub type CoverageSnapshot = BTreeMap<String, LineCounts>;

/// Signed per-line differences between two normalized snapshots.
pub type CoverageDelta = BTreeMap<String, LineCounts>;

/// Test identifier attributed to lines executed while the suite was loading.
pub const BASE_TEST_ID: &str = "base";

const STATS_TAG: &str = "stats";

/// How tests are ordered across collection runs.
///
/// The rolling baseline is only reproducible when the order is repeatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOrderPolicy {
    #[default]
    Random,
    RandomSeeded,
    Ordered,
}

impl TestOrderPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RandomSeeded => "random_seeded",
            Self::Ordered => "ordered",
        }
    }

    pub fn rolls_baseline(self) -> bool {
        matches!(self, Self::RandomSeeded | Self::Ordered)
    }
}

impl FromStr for TestOrderPolicy {
    type Err = CovetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "random_seeded" | "random-seeded" | "seeded" => Ok(Self::RandomSeeded),
            "ordered" | "defined" | "alpha" => Ok(Self::Ordered),
            _ => Err(CovetError::InvalidTestOrderPolicy { value: s.to_string() }),
        }
    }
}

impl fmt::Display for TestOrderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options recorded with the run so a later replay can tell how it was collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunOptions {
    pub test_order: TestOrderPolicy,
    pub test_runner: String,
    pub batch_size: usize,
}

/// Metadata carried by the `base` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RunMetadata {
    pub fn current(options: RunOptions, seed: Option<u64>) -> Self {
        Self { version: env!("CARGO_PKG_VERSION").to_string(), options, seed }
    }

    pub fn is_current_version(&self) -> bool {
        self.version == env!("CARGO_PKG_VERSION")
    }
}

/// Wall-clock time a test took, serialized as `{"time": "<seconds>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTiming {
    pub time: String,
}

impl TestTiming {
    pub fn from_duration(elapsed: Duration) -> Self {
        Self { time: format!("{:.6}", elapsed.as_secs_f64()) }
    }

    pub fn from_seconds(seconds: f64) -> Self {
        Self { time: format!("{:.6}", seconds) }
    }

    pub fn seconds(&self) -> Option<f64> {
        self.time.parse().ok()
    }
}

/// Summary appended as the final record of a collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunStats {
    pub version: String,
    pub tests_run: usize,
    pub tests_logged: usize,
    pub tests_skipped: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    /// Files removed by the collection filter, counted per reason.
    pub filtered: BTreeMap<String, usize>,
}

/// One element of the run log.
///
/// On disk every record is a JSON array:
/// - `["base", <snapshot>, {"version": .., "options": .., "seed": ..}]`
/// - `[<test id>, <delta or null>, {"time": "<seconds>"}]`
/// - `["stats", {..}]`
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Base { snapshot: CoverageSnapshot, metadata: RunMetadata },
    TestResult { test_id: String, delta: Option<CoverageDelta>, timing: Option<TestTiming> },
    Stats(RunStats),
}

impl LogRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Base { .. } => BASE_TEST_ID,
            Self::TestResult { .. } => "test",
            Self::Stats(_) => STATS_TAG,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        Ok(match self {
            Self::Base { snapshot, metadata } => {
                json!([
                    BASE_TEST_ID,
                    serde_json::to_value(snapshot)?,
                    serde_json::to_value(metadata)?
                ])
            }
            Self::TestResult { test_id, delta, timing } => {
                json!([test_id, serde_json::to_value(delta)?, serde_json::to_value(timing)?])
            }
            Self::Stats(stats) => json!([STATS_TAG, serde_json::to_value(stats)?]),
        })
    }

    /// Decode a record from its JSON array form.
    ///
    /// A three-element array tagged `"base"` is the base record and a
    /// two-element array tagged `"stats"` is the stats record; every other
    /// three-element array is a test result.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Array(items) = value else {
            return Err("expected a JSON array record".to_string());
        };
        let mut items = items.into_iter();
        let tag = match items.next() {
            Some(Value::String(tag)) => tag,
            Some(other) => return Err(format!("record tag must be a string, got {other}")),
            None => return Err("empty record".to_string()),
        };
        let rest: Vec<Value> = items.collect();

        match (tag.as_str(), rest.len()) {
            (STATS_TAG, 1) => {
                let stats = serde_json::from_value(rest.into_iter().next().unwrap_or(Value::Null))
                    .map_err(|e| format!("invalid stats record: {e}"))?;
                Ok(Self::Stats(stats))
            }
            (_, 2) => {
                let mut rest = rest.into_iter();
                let payload = rest.next().unwrap_or(Value::Null);
                let meta = rest.next().unwrap_or(Value::Null);
                if tag == BASE_TEST_ID {
                    let snapshot = serde_json::from_value(payload)
                        .map_err(|e| format!("invalid base snapshot: {e}"))?;
                    let metadata = serde_json::from_value(meta)
                        .map_err(|e| format!("invalid base metadata: {e}"))?;
                    return Ok(Self::Base { snapshot, metadata });
                }
                let delta = serde_json::from_value(payload)
                    .map_err(|e| format!("invalid delta for '{tag}': {e}"))?;
                let timing = serde_json::from_value(meta)
                    .map_err(|e| format!("invalid timing for '{tag}': {e}"))?;
                Ok(Self::TestResult { test_id: tag, delta, timing })
            }
            (_, n) => Err(format!("record '{tag}' has {} elements", n + 1)),
        }
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().map_err(serde::ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LogRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

/// A changed line reported by the VCS, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineChange {
    pub file: String,
    pub line: u32,
}

impl LineChange {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

pub type LineChanges = BTreeSet<LineChange>;

/// Narrowing applied to a test identifier beyond its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFilter<'a> {
    Method(&'a str),
    Line(u32),
}

/// One selected test: the changed source file and the test that covers it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunListEntry {
    pub source_file: String,
    pub test_id: String,
}

impl RunListEntry {
    pub fn new(source_file: impl Into<String>, test_id: impl Into<String>) -> Self {
        Self { source_file: source_file.into(), test_id: test_id.into() }
    }

    /// File component of the test identifier.
    pub fn test_file(&self) -> &str {
        split_test_id(&self.test_id).0
    }

    pub fn filter(&self) -> Option<TestFilter<'_>> {
        split_test_id(&self.test_id).1
    }

    pub fn is_whole_file(&self) -> bool {
        self.filter().is_none()
    }
}

/// Split `path#method` or `path:line` into its file and filter parts.
pub fn split_test_id(test_id: &str) -> (&str, Option<TestFilter<'_>>) {
    if let Some((file, method)) = test_id.split_once('#') {
        if !method.is_empty() {
            return (file, Some(TestFilter::Method(method)));
        }
        return (file, None);
    }
    if let Some((file, line)) = test_id.rsplit_once(':') {
        if let Ok(line) = line.parse::<u32>() {
            return (file, Some(TestFilter::Line(line)));
        }
    }
    (test_id, None)
}

/// Collection filter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Root of the language runtime's standard library.
    pub stdlib_root: Option<PathBuf>,
    /// Loaded third-party packages: name -> install root.
    pub packages: BTreeMap<String, PathBuf>,
    /// Packages whose files are kept.
    #[serde(deserialize_with = "deserialize_string_list")]
    pub whitelist_packages: Vec<String>,
    /// Absolute paths that are never filtered.
    #[serde(deserialize_with = "deserialize_string_list")]
    pub whitelist_files: Vec<String>,
    /// Regular expressions; matching files are never filtered.
    #[serde(deserialize_with = "deserialize_string_list")]
    pub whitelist_patterns: Vec<String>,
}

/// Resolved configuration (file values merged with CLI overrides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vcs: String,
    pub test_runner: String,
    pub test_order: String,
    pub seed: Option<u64>,
    pub log_file: PathBuf,
    pub index_file: PathBuf,
    pub batch_size: usize,
    pub context_lines: u32,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub test_directories: Vec<String>,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub test_file_patterns: Vec<String>,
    pub filter: FilterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vcs: "git".to_string(),
            test_runner: "minitest".to_string(),
            test_order: TestOrderPolicy::default().as_str().to_string(),
            seed: None,
            log_file: PathBuf::from("run_log.json"),
            index_file: PathBuf::from("run_log_index.json"),
            batch_size: 100,
            context_lines: 3,
            test_directories: vec!["test".to_string(), "spec".to_string()],
            test_file_patterns: default_test_file_patterns()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            filter: FilterConfig::default(),
        }
    }
}

impl Config {
    pub fn test_order(&self) -> Result<TestOrderPolicy, CovetError> {
        self.test_order.parse()
    }

    pub fn run_options(&self) -> Result<RunOptions, CovetError> {
        Ok(RunOptions {
            test_order: self.test_order()?,
            test_runner: self.test_runner.clone(),
            batch_size: self.batch_size,
        })
    }
}

pub fn default_test_file_patterns() -> &'static [&'static str] {
    &["*_test.rb", "test_*.rb", "*_spec.rb"]
}

/// Accept either a list of strings or a single comma-separated string.
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    let items = match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s.split(',').map(str::to_string).collect::<Vec<_>>(),
        StringOrList::Many(v) => v,
    };
    Ok(items.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_policy_parses_known_values() {
        assert_eq!("ordered".parse::<TestOrderPolicy>().unwrap(), TestOrderPolicy::Ordered);
        assert_eq!(
            "random_seeded".parse::<TestOrderPolicy>().unwrap(),
            TestOrderPolicy::RandomSeeded
        );
        assert_eq!(" Random ".parse::<TestOrderPolicy>().unwrap(), TestOrderPolicy::Random);
    }

    #[test]
    fn test_order_policy_rejects_unknown_value() {
        let err = "shuffled".parse::<TestOrderPolicy>().unwrap_err();
        assert!(matches!(
            err,
            CovetError::InvalidTestOrderPolicy { ref value } if value == "shuffled"
        ));
    }

    #[test]
    fn base_record_uses_array_layout() {
        let mut snapshot = CoverageSnapshot::new();
        snapshot.insert("/app/lib/a.rb".to_string(), LineCounts::from([(1, 1), (5, 2)]));
        let record = LogRecord::Base {
            snapshot,
            metadata: RunMetadata::current(RunOptions::default(), Some(7)),
        };

        let value = record.to_value().unwrap();
        assert_eq!(value[0], "base");
        assert_eq!(value[1]["/app/lib/a.rb"]["5"], 2);
        assert_eq!(value[2]["seed"], 7);
        assert_eq!(LogRecord::from_value(value).unwrap(), record);
    }

    #[test]
    fn test_result_accepts_null_delta() {
        let value = json!(["test/a_test.rb#test_x", null, {"time": "0.100000"}]);
        let record = LogRecord::from_value(value).unwrap();
        match record {
            LogRecord::TestResult { test_id, delta, timing } => {
                assert_eq!(test_id, "test/a_test.rb#test_x");
                assert!(delta.is_none());
                assert_eq!(timing.and_then(|t| t.seconds()), Some(0.1));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn stats_record_is_two_elements() {
        let record = LogRecord::Stats(RunStats { tests_run: 3, ..RunStats::default() });
        let text = serde_json::to_string(&record).unwrap();
        assert!(text.starts_with("[\"stats\",{"));
        let back: LogRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(LogRecord::from_value(json!({"a": 1})).is_err());
        assert!(LogRecord::from_value(json!([])).is_err());
        assert!(LogRecord::from_value(json!([1, 2, 3])).is_err());
        assert!(LogRecord::from_value(json!(["t", {}, {}, {}])).is_err());
    }

    #[test]
    fn split_test_id_handles_methods_and_lines() {
        assert_eq!(
            split_test_id("test/a_test.rb#test_one"),
            ("test/a_test.rb", Some(TestFilter::Method("test_one")))
        );
        assert_eq!(
            split_test_id("spec/a_spec.rb:12"),
            ("spec/a_spec.rb", Some(TestFilter::Line(12)))
        );
        assert_eq!(split_test_id("test/a_test.rb"), ("test/a_test.rb", None));
    }

    #[test]
    fn string_lists_accept_comma_separated_values() {
        let cfg: Config = toml::from_str("test_directories = \"test, spec ,features\"\n").unwrap();
        assert_eq!(cfg.test_directories, vec!["test", "spec", "features"]);
    }
}
