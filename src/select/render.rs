//! Run-list output formats

use crate::error::{CovetError, Result};
use crate::select::runner::TestRunnerAdapter;
use crate::select::Selection;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const NO_TESTS_TO_RUN: &str = "# No test cases to run";
pub const LOAD_TIME_BANNER: &str =
    "You need to run every test file due to change(s) to line(s) that run on application load.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable list of test files.
    #[default]
    List,
    /// One shell command line for the configured test runner.
    TestRunner,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::TestRunner => "test-runner",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CovetError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "list" | "simple" => Ok(Self::List),
            "test-runner" | "test_runner" => Ok(Self::TestRunner),
            "json" => Ok(Self::Json),
            _ => Err(CovetError::InvalidFormat { value: value.to_string() }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render `selection` in `format`. `runner` builds the `test-runner` command.
pub fn render(
    selection: &Selection,
    format: OutputFormat,
    runner: &dyn TestRunnerAdapter,
) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(selection),
        OutputFormat::List | OutputFormat::TestRunner => Ok(render_text(selection, format, runner)),
    }
}

fn render_text(
    selection: &Selection,
    format: OutputFormat,
    runner: &dyn TestRunnerAdapter,
) -> String {
    match selection {
        Selection::NoChanges { revision } => format!("# No changes since {revision}"),
        Selection::MissingLog { path } => format!(
            "# No run log at {}. Collect coverage with `covet record` first.",
            path.display()
        ),
        _ if selection.is_empty() => NO_TESTS_TO_RUN.to_string(),
        Selection::AllTestFiles { test_files, .. } => match format {
            OutputFormat::TestRunner => runner.command_for_all(test_files),
            _ => LOAD_TIME_BANNER.to_string(),
        },
        Selection::RunList(list) => match format {
            OutputFormat::TestRunner => runner.command_for(list),
            _ => {
                let mut lines = vec!["You need to run:".to_string()];
                lines.extend(list.test_files().into_iter().map(|file| format!(" - {file}")));
                lines.join("\n")
            }
        },
    }
}

fn render_json(selection: &Selection) -> Result<String> {
    let document: Value = match selection {
        Selection::NoChanges { revision } => json!({
            "test_files": [],
            "tests": [],
            "meta": { "no_changes": true, "revision": revision.to_string() },
        }),
        Selection::MissingLog { path } => json!({
            "test_files": [],
            "tests": [],
            "meta": { "missing_log": true, "log_file": path.display().to_string() },
        }),
        _ if selection.is_empty() => json!({ "test_files": [], "tests": [], "meta": {} }),
        Selection::AllTestFiles { test_files, load_time_changes } => json!({
            "test_files": test_files,
            "tests": [],
            "meta": {
                "all_files": true,
                "load_time_changes": load_time_changes
                    .iter()
                    .map(|c| json!({ "file": c.file, "line": c.line }))
                    .collect::<Vec<_>>(),
            },
        }),
        Selection::RunList(list) => json!({
            "test_files": list.test_files(),
            "tests": list.entries().collect::<Vec<_>>(),
            "meta": { "method_filtering": list.method_filtering },
        }),
    };
    Ok(serde_json::to_string(&document)?)
}
