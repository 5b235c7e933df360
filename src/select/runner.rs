//! Shell command lines for running a run list with a specific test runner

use crate::domain::TestFilter;
use crate::error::{CovetError, Result};
use crate::select::resolver::RunList;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;

static SHELL_SAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./:=@%+,-]+$").expect("valid shell-safe regex"));

/// Quote `arg` for a POSIX shell when it contains anything unsafe.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && SHELL_SAFE.is_match(arg) {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

fn join_command<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts.into_iter().map(shell_quote).collect::<Vec<_>>().join(" ")
}

pub trait TestRunnerAdapter {
    fn name(&self) -> &'static str;

    /// Command running exactly the selected tests.
    fn command_for(&self, run_list: &RunList) -> String;

    /// Command running every given test file.
    fn command_for_all(&self, test_files: &[String]) -> String;
}

const MINITEST_LOADER: &str =
    "ARGV.each { |f| require File.expand_path(f) unless f.start_with?('-') }";

pub struct Minitest;

impl Minitest {
    fn command(files: &[&str], name_filter: Option<String>) -> String {
        let mut parts = vec!["ruby", "-Itest", "-e", MINITEST_LOADER, "--"];
        parts.extend(files.iter().copied());
        let name_arg = name_filter.map(|f| format!("--name=/^({f})$/"));
        if let Some(arg) = name_arg.as_deref() {
            parts.push(arg);
        }
        join_command(parts)
    }
}

impl TestRunnerAdapter for Minitest {
    fn name(&self) -> &'static str {
        "minitest"
    }

    fn command_for(&self, run_list: &RunList) -> String {
        let files = run_list.test_files();
        // A name filter applies to every loaded file, so it is only safe when
        // no file has to run in full.
        let methods: Vec<&str> = run_list
            .methods
            .iter()
            .filter_map(|entry| match entry.filter() {
                Some(TestFilter::Method(method)) => Some(method),
                _ => None,
            })
            .collect();
        let filterable = run_list.method_filtering
            && run_list.whole_files.is_empty()
            && !methods.is_empty()
            && methods.len() == run_list.methods.len();
        let name_filter = filterable.then(|| {
            let mut unique: Vec<String> = methods.iter().map(|m| regex::escape(m)).collect();
            unique.sort();
            unique.dedup();
            unique.join("|")
        });
        Self::command(&files, name_filter)
    }

    fn command_for_all(&self, test_files: &[String]) -> String {
        let files: Vec<&str> = test_files.iter().map(String::as_str).collect();
        Self::command(&files, None)
    }
}

pub struct Rspec;

impl TestRunnerAdapter for Rspec {
    fn name(&self) -> &'static str {
        "rspec"
    }

    fn command_for(&self, run_list: &RunList) -> String {
        if !run_list.method_filtering {
            let files = run_list.test_files();
            return join_command(std::iter::once("rspec").chain(files));
        }

        let mut locations: Vec<String> = Vec::new();
        let mut examples: Vec<&str> = Vec::new();
        for entry in run_list.entries() {
            let location = match entry.filter() {
                Some(TestFilter::Line(line)) => format!("{}:{}", entry.test_file(), line),
                Some(TestFilter::Method(description)) => {
                    if !examples.contains(&description) {
                        examples.push(description);
                    }
                    entry.test_file().to_string()
                }
                None => entry.test_file().to_string(),
            };
            if !locations.contains(&location) {
                locations.push(location);
            }
        }

        // `-e` narrows every file, so drop it when some file must run in full.
        if !run_list.whole_files.is_empty() {
            examples.clear();
        }

        let mut parts: Vec<&str> = vec!["rspec"];
        parts.extend(locations.iter().map(String::as_str));
        for example in examples {
            parts.push("-e");
            parts.push(example);
        }
        join_command(parts)
    }

    fn command_for_all(&self, test_files: &[String]) -> String {
        join_command(std::iter::once("rspec").chain(test_files.iter().map(String::as_str)))
    }
}

pub struct RunnerRegistry {
    runners: BTreeMap<&'static str, Box<dyn TestRunnerAdapter>>,
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        let mut registry = Self { runners: BTreeMap::new() };
        registry.register(Box::new(Minitest));
        registry.register(Box::new(Rspec));
        registry
    }
}

impl RunnerRegistry {
    pub fn register(&mut self, runner: Box<dyn TestRunnerAdapter>) {
        self.runners.insert(runner.name(), runner);
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn TestRunnerAdapter> {
        self.runners.get(name).map(|runner| runner.as_ref()).ok_or_else(|| {
            CovetError::UnknownTestRunner {
                name: name.to_string(),
                available: self.runners.keys().copied().collect::<Vec<_>>().join(", "),
            }
        })
    }
}
