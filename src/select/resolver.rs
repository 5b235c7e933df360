//! Join changed lines against recorded coverage to decide what to run

use crate::domain::{LineChange, LineChanges, RunListEntry, BASE_TEST_ID};
use crate::error::{CovetError, Result};
use crate::select::coverage_index::CoverageIndex;
use crate::utils::{absolute_in, normalize_path, relative_to};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Recognizes test files by directory prefix and file name pattern.
pub struct TestFileMatcher {
    directories: Vec<String>,
    patterns: GlobSet,
}

impl TestFileMatcher {
    pub fn new(directories: &[String], patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| CovetError::InvalidPattern {
                pattern: pattern.clone(),
                detail: e.to_string(),
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|e| CovetError::InvalidPattern {
            pattern: patterns.join(","),
            detail: e.to_string(),
        })?;
        let directories = directories
            .iter()
            .map(|d| normalize_path(d).trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        Ok(Self { directories, patterns })
    }

    /// Whether the repository-relative `file` is a test file.
    pub fn is_test_file(&self, file: &str) -> bool {
        let file = normalize_path(file);
        let in_test_dir = self
            .directories
            .iter()
            .any(|dir| file.strip_prefix(dir.as_str()).is_some_and(|rest| rest.starts_with('/')));
        if !in_test_dir {
            return false;
        }
        let name = file.rsplit('/').next().unwrap_or(&file);
        self.patterns.is_match(name)
    }

    /// Every test file under `root`, repository-relative and sorted.
    pub fn enumerate(&self, root: &Path) -> Vec<String> {
        let mut files: Vec<String> = self
            .directories
            .iter()
            .flat_map(|dir| WalkDir::new(root.join(dir)).follow_links(false).into_iter())
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| relative_to(root, entry.path()))
            .filter(|rel| self.is_test_file(rel))
            .collect();
        files.sort();
        files.dedup();
        files
    }
}

/// Selected tests, split by granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunList {
    pub whole_files: Vec<RunListEntry>,
    pub methods: Vec<RunListEntry>,
    /// Cleared when a changed test file forces file-level granularity.
    pub method_filtering: bool,
}

impl RunList {
    pub fn is_empty(&self) -> bool {
        self.whole_files.is_empty() && self.methods.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RunListEntry> {
        self.whole_files.iter().chain(self.methods.iter())
    }

    /// Distinct test files in first-seen order.
    pub fn test_files(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries().map(RunListEntry::test_file).filter(|f| seen.insert(*f)).collect()
    }

    /// Distinct test identifiers in first-seen order.
    pub fn test_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries().map(|e| e.test_id.as_str()).filter(|id| seen.insert(*id)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A change hit code that only runs while the suite loads.
    AllTestFiles { load_time_changes: Vec<LineChange> },
    RunList(RunList),
}

struct Candidate {
    entry: RunListEntry,
    line: u32,
}

impl Candidate {
    fn is_base(&self) -> bool {
        self.entry.test_id == BASE_TEST_ID
    }
}

pub struct RunListResolver<'a> {
    index: &'a CoverageIndex,
    matcher: &'a TestFileMatcher,
    root: &'a Path,
}

impl<'a> RunListResolver<'a> {
    pub fn new(index: &'a CoverageIndex, matcher: &'a TestFileMatcher, root: &'a Path) -> Self {
        Self { index, matcher, root }
    }

    fn covering_tests(&self, file: &str, line: u32) -> Vec<&'a str> {
        let absolute = absolute_in(self.root, file);
        let key = if self.index.contains_file(&absolute) { absolute.as_str() } else { file };
        self.index.tests_for(key, line).collect()
    }

    pub fn resolve(&self, changes: &LineChanges) -> Resolution {
        let mut candidates = Vec::new();
        let mut method_filtering = true;

        for change in changes {
            if self.matcher.is_test_file(&change.file) {
                // Which tests a changed test file holds is unknown; run it all.
                candidates.push(Candidate {
                    entry: RunListEntry::new(&change.file, &change.file),
                    line: change.line,
                });
                method_filtering = false;
                continue;
            }
            for test_id in self.covering_tests(&change.file, change.line) {
                candidates.push(Candidate {
                    entry: RunListEntry::new(&change.file, test_id),
                    line: change.line,
                });
            }
        }

        // Coverage for a load-time line is logged one line off from the
        // source; a test candidate within a line of a base candidate already
        // accounts for it.
        let load_time_changes: Vec<LineChange> = candidates
            .iter()
            .filter(|c| c.is_base())
            .filter(|base| {
                !candidates.iter().any(|other| {
                    !other.is_base()
                        && other.entry.source_file == base.entry.source_file
                        && other.line.abs_diff(base.line) <= 1
                })
            })
            .map(|c| LineChange::new(&c.entry.source_file, c.line))
            .collect();

        if !load_time_changes.is_empty() {
            tracing::info!(
                changes = load_time_changes.len(),
                "load-time code changed; selecting every test file"
            );
            return Resolution::AllTestFiles { load_time_changes };
        }

        let mut seen = HashSet::new();
        let mut run_list = RunList { method_filtering, ..RunList::default() };
        for candidate in candidates.into_iter().filter(|c| !c.is_base()) {
            if !seen.insert(candidate.entry.clone()) {
                continue;
            }
            if candidate.entry.is_whole_file() {
                run_list.whole_files.push(candidate.entry);
            } else {
                run_list.methods.push(candidate.entry);
            }
        }
        Resolution::RunList(run_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoverageDelta, LineCounts, LogRecord, RunMetadata};
    use std::fs;
    use tempfile::TempDir;

    fn matcher() -> TestFileMatcher {
        TestFileMatcher::new(
            &["test".to_string(), "spec".to_string()],
            &["*_test.rb".to_string(), "*_spec.rb".to_string()],
        )
        .unwrap()
    }

    fn changes(items: &[(&str, u32)]) -> LineChanges {
        items.iter().map(|(f, l)| LineChange::new(*f, *l)).collect()
    }

    fn index_with(records: Vec<LogRecord>) -> CoverageIndex {
        CoverageIndex::from_records(records.into_iter().map(Ok)).unwrap()
    }

    fn coverage(file: &str, lines: &[u32]) -> CoverageDelta {
        let counts: LineCounts = lines.iter().map(|l| (*l, 1)).collect();
        CoverageDelta::from([(file.to_string(), counts)])
    }

    fn test_result(id: &str, file: &str, lines: &[u32]) -> LogRecord {
        LogRecord::TestResult {
            test_id: id.to_string(),
            delta: Some(coverage(file, lines)),
            timing: None,
        }
    }

    fn base(file: &str, lines: &[u32]) -> LogRecord {
        LogRecord::Base {
            snapshot: coverage(file, lines),
            metadata: RunMetadata::current(Default::default(), None),
        }
    }

    #[test]
    fn matcher_requires_directory_and_name() {
        let m = matcher();
        assert!(m.is_test_file("test/models/user_test.rb"));
        assert!(m.is_test_file("spec/user_spec.rb"));
        assert!(!m.is_test_file("test/test_helper.rb"));
        assert!(!m.is_test_file("lib/user_test.rb"));
        assert!(!m.is_test_file("testing/user_test.rb"));
    }

    #[test]
    fn minimal_rerun_selects_covering_test() {
        let index = index_with(vec![test_result("T1", "/repo/lib/a.rb", &[10])]);
        let m = matcher();
        let resolution = RunListResolver::new(&index, &m, Path::new("/repo"))
            .resolve(&changes(&[("lib/a.rb", 10)]));

        let Resolution::RunList(list) = resolution else { panic!("expected run list") };
        assert_eq!(
            list.entries().cloned().collect::<Vec<_>>(),
            vec![RunListEntry::new("lib/a.rb", "T1")]
        );
        assert!(list.method_filtering);
    }

    #[test]
    fn load_time_change_escalates_to_all_files() {
        let index = index_with(vec![
            base("/repo/lib/a.rb", &[5]),
            test_result("test/a_test.rb#test_x", "/repo/lib/a.rb", &[10]),
        ]);
        let m = matcher();
        let resolution = RunListResolver::new(&index, &m, Path::new("/repo"))
            .resolve(&changes(&[("lib/a.rb", 5), ("lib/a.rb", 10)]));

        assert_eq!(
            resolution,
            Resolution::AllTestFiles { load_time_changes: vec![LineChange::new("lib/a.rb", 5)] }
        );
    }

    #[test]
    fn base_candidate_next_to_test_candidate_is_redundant() {
        let index = index_with(vec![
            base("/repo/lib/a.rb", &[5]),
            test_result("test/a_test.rb#test_x", "/repo/lib/a.rb", &[6]),
        ]);
        let m = matcher();
        let resolution = RunListResolver::new(&index, &m, Path::new("/repo"))
            .resolve(&changes(&[("lib/a.rb", 5), ("lib/a.rb", 6)]));

        let Resolution::RunList(list) = resolution else { panic!("expected run list") };
        assert_eq!(list.test_ids(), vec!["test/a_test.rb#test_x"]);
    }

    #[test]
    fn changed_test_file_runs_whole_file_and_disables_method_filtering() {
        let index = index_with(vec![
            test_result("test/a_test.rb#test_x", "/repo/lib/a.rb", &[3]),
            test_result("test/a_test.rb#test_y", "/repo/lib/a.rb", &[3]),
        ]);
        let m = matcher();
        let resolution = RunListResolver::new(&index, &m, Path::new("/repo"))
            .resolve(&changes(&[("lib/a.rb", 3), ("test/b_test.rb", 1), ("test/b_test.rb", 2)]));

        let Resolution::RunList(list) = resolution else { panic!("expected run list") };
        assert!(!list.method_filtering);
        assert_eq!(list.whole_files, vec![RunListEntry::new("test/b_test.rb", "test/b_test.rb")]);
        assert_eq!(list.methods.len(), 2);
        assert_eq!(list.test_files(), vec!["test/b_test.rb", "test/a_test.rb"]);
    }

    #[test]
    fn duplicates_are_removed() {
        let index = index_with(vec![test_result("T1", "/repo/lib/a.rb", &[1, 2, 3])]);
        let m = matcher();
        let resolution = RunListResolver::new(&index, &m, Path::new("/repo"))
            .resolve(&changes(&[("lib/a.rb", 1), ("lib/a.rb", 2), ("lib/a.rb", 3)]));

        let Resolution::RunList(list) = resolution else { panic!("expected run list") };
        assert_eq!(list.entries().count(), 1);
    }

    #[test]
    fn no_changes_yield_empty_run_list() {
        let index = CoverageIndex::new();
        let m = matcher();
        let resolution =
            RunListResolver::new(&index, &m, Path::new("/repo")).resolve(&LineChanges::new());
        assert_eq!(
            resolution,
            Resolution::RunList(RunList { method_filtering: true, ..RunList::default() })
        );
    }

    #[test]
    fn enumerate_finds_test_files() {
        let tmp = TempDir::new().expect("tmp");
        for rel in ["test/a_test.rb", "test/nested/b_test.rb", "test/test_helper.rb", "lib/c.rb"] {
            let path = tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        assert_eq!(
            matcher().enumerate(tmp.path()),
            vec!["test/a_test.rb", "test/nested/b_test.rb"]
        );
    }
}
