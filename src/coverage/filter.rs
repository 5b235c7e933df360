//! Removal of noise files before coverage is persisted
//!
//! Standard library and third-party package files would otherwise dominate
//! the run log. Precedence per file: whitelist (path or regex) keeps it,
//! then the stdlib root, then loaded package roots, then custom predicates.

use crate::domain::{CoverageSnapshot, FilterConfig};
use crate::error::{CovetError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

type PredicateError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Returns `Ok(true)` when the file should be removed.
pub type FilterPredicate = Box<dyn Fn(&str) -> std::result::Result<bool, PredicateError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterReason {
    Stdlib,
    Package,
    Custom,
}

impl FilterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdlib => "stdlib",
            Self::Package => "package",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which files were removed and why. Observation only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    removed: BTreeMap<FilterReason, BTreeSet<String>>,
}

impl FilterReport {
    fn record(&mut self, reason: FilterReason, file: &str) {
        self.removed.entry(reason).or_default().insert(file.to_string());
    }

    pub fn files(&self, reason: FilterReason) -> impl Iterator<Item = &str> {
        self.removed.get(&reason).into_iter().flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.removed
            .iter()
            .map(|(reason, files)| (reason.as_str().to_string(), files.len()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.values().all(BTreeSet::is_empty)
    }
}

struct PackageRoot {
    name: String,
    root: PathBuf,
}

pub struct CollectionFilter {
    stdlib_root: Option<PathBuf>,
    packages: Vec<PackageRoot>,
    package_whitelist: BTreeSet<String>,
    file_whitelist: BTreeSet<String>,
    regex_whitelist: Vec<Regex>,
    predicates: Vec<FilterPredicate>,
    report: FilterReport,
}

impl Default for CollectionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionFilter {
    /// A filter that keeps everything.
    pub fn new() -> Self {
        Self {
            stdlib_root: None,
            packages: Vec::new(),
            package_whitelist: BTreeSet::new(),
            file_whitelist: BTreeSet::new(),
            regex_whitelist: Vec::new(),
            predicates: Vec::new(),
            report: FilterReport::default(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut filter = Self::new();
        if let Some(root) = &config.stdlib_root {
            filter = filter.stdlib_root(root.clone());
        }
        for (name, root) in &config.packages {
            filter = filter.package(name.clone(), root.clone());
        }
        for name in &config.whitelist_packages {
            filter = filter.whitelist_package(name.clone());
        }
        for file in &config.whitelist_files {
            filter = filter.whitelist_file(file.clone())?;
        }
        for pattern in &config.whitelist_patterns {
            filter = filter.whitelist_pattern(pattern)?;
        }
        Ok(filter)
    }

    /// Set the language runtime's standard library root
    pub fn stdlib_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.stdlib_root = Some(root.into());
        self
    }

    /// Register a loaded third-party package
    pub fn package(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.packages.push(PackageRoot { name: name.into(), root: root.into() });
        self
    }

    /// Keep files belonging to this package
    pub fn whitelist_package(mut self, name: impl Into<String>) -> Self {
        self.package_whitelist.insert(name.into());
        self
    }

    /// Never filter this absolute path
    pub fn whitelist_file(mut self, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !Path::new(&path).is_absolute() {
            return Err(CovetError::InvalidPattern {
                pattern: path,
                detail: "whitelisted files must be absolute paths".to_string(),
            });
        }
        self.file_whitelist.insert(path);
        Ok(self)
    }

    /// Never filter files matching this regular expression
    pub fn whitelist_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| CovetError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: e.to_string(),
        })?;
        self.regex_whitelist.push(regex);
        Ok(self)
    }

    /// Remove files for which `predicate` returns `Ok(true)`
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<bool, PredicateError> + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn report(&self) -> &FilterReport {
        &self.report
    }

    fn is_whitelisted(&self, file: &str) -> bool {
        self.file_whitelist.contains(file)
            || self.regex_whitelist.iter().any(|re| re.is_match(file))
    }

    fn removal_reason(&self, file: &str) -> Result<Option<FilterReason>> {
        if self.is_whitelisted(file) {
            return Ok(None);
        }
        let path = Path::new(file);
        if self.stdlib_root.as_deref().is_some_and(|root| path.starts_with(root)) {
            return Ok(Some(FilterReason::Stdlib));
        }
        let in_package = self
            .packages
            .iter()
            .filter(|pkg| !self.package_whitelist.contains(&pkg.name))
            .any(|pkg| path.starts_with(&pkg.root));
        if in_package {
            return Ok(Some(FilterReason::Package));
        }
        for predicate in &self.predicates {
            let remove = predicate(file)
                .map_err(|source| CovetError::FilterPredicate { path: file.to_string(), source })?;
            if remove {
                return Ok(Some(FilterReason::Custom));
            }
        }
        Ok(None)
    }

    /// Return `snapshot` without noise files, recording what was removed.
    pub fn filter(&mut self, mut snapshot: CoverageSnapshot) -> Result<CoverageSnapshot> {
        let mut removed = Vec::new();
        for file in snapshot.keys() {
            if let Some(reason) = self.removal_reason(file)? {
                removed.push((file.clone(), reason));
            }
        }
        for (file, reason) in removed {
            tracing::debug!(file = %file, reason = %reason, "filtered coverage");
            snapshot.remove(&file);
            self.report.record(reason, &file);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LineCounts;

    fn snapshot(files: &[&str]) -> CoverageSnapshot {
        files.iter().map(|f| (f.to_string(), LineCounts::from([(1, 1)]))).collect()
    }

    #[test]
    fn removes_stdlib_and_package_files() {
        let mut filter = CollectionFilter::new()
            .stdlib_root("/usr/lib/ruby/3.2.0")
            .package("minitest", "/gems/minitest-5.20")
            .package("nokogiri", "/gems/nokogiri-1.15")
            .whitelist_package("nokogiri");

        let out = filter
            .filter(snapshot(&[
                "/usr/lib/ruby/3.2.0/set.rb",
                "/gems/minitest-5.20/lib/minitest.rb",
                "/gems/nokogiri-1.15/lib/nokogiri.rb",
                "/app/lib/a.rb",
            ]))
            .unwrap();

        let kept: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(kept, vec!["/app/lib/a.rb", "/gems/nokogiri-1.15/lib/nokogiri.rb"]);
        assert_eq!(
            filter.report().files(FilterReason::Stdlib).collect::<Vec<_>>(),
            vec!["/usr/lib/ruby/3.2.0/set.rb"]
        );
        assert_eq!(filter.report().counts()["package"], 1);
    }

    #[test]
    fn whitelist_short_circuits_every_removal() {
        let mut filter = CollectionFilter::new()
            .stdlib_root("/usr/lib/ruby")
            .whitelist_file("/usr/lib/ruby/json.rb")
            .unwrap()
            .whitelist_pattern(r"/ruby/set\.rb$")
            .unwrap()
            .predicate(|_| Ok(true));

        let out = filter
            .filter(snapshot(&["/usr/lib/ruby/json.rb", "/usr/lib/ruby/set.rb", "/app/a.rb"]))
            .unwrap();

        assert!(out.contains_key("/usr/lib/ruby/json.rb"));
        assert!(out.contains_key("/usr/lib/ruby/set.rb"));
        assert!(!out.contains_key("/app/a.rb"));
        assert_eq!(filter.report().counts()["custom"], 1);
    }

    #[test]
    fn stdlib_root_matches_whole_components() {
        let mut filter = CollectionFilter::new().stdlib_root("/usr/lib/ruby");
        let out = filter.filter(snapshot(&["/usr/lib/ruby-app/a.rb"])).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn relative_whitelist_file_is_rejected() {
        assert!(CollectionFilter::new().whitelist_file("lib/a.rb").is_err());
    }

    #[test]
    fn predicate_errors_propagate() {
        let mut filter = CollectionFilter::new().predicate(|file| {
            if file.ends_with("boom.rb") {
                Err("predicate exploded".into())
            } else {
                Ok(false)
            }
        });
        let err = filter.filter(snapshot(&["/app/boom.rb"])).unwrap_err();
        assert!(matches!(
            err,
            CovetError::FilterPredicate { ref path, .. } if path == "/app/boom.rb"
        ));
    }
}
