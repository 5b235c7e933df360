//! CLI overrides on top of file configuration

use crate::domain::Config;
use std::path::PathBuf;

/// Values given on the command line. `None` keeps the file (or default) value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub vcs: Option<String>,
    pub test_runner: Option<String>,
    pub test_order: Option<String>,
    pub seed: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub index_file: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub context_lines: Option<u32>,
    pub test_directories: Option<Vec<String>>,
    pub test_file_patterns: Option<Vec<String>>,
}

pub fn merge_cli_with_config(mut config: Config, cli: CliOverrides) -> Config {
    if let Some(vcs) = cli.vcs {
        config.vcs = vcs;
    }
    if let Some(test_runner) = cli.test_runner {
        config.test_runner = test_runner;
    }
    if let Some(test_order) = cli.test_order {
        config.test_order = test_order;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = log_file;
    }
    if let Some(index_file) = cli.index_file {
        config.index_file = index_file;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size.max(1);
    }
    if let Some(context_lines) = cli.context_lines {
        config.context_lines = context_lines;
    }
    if let Some(dirs) = cli.test_directories.filter(|d| !d.is_empty()) {
        config.test_directories = dirs;
    }
    if let Some(patterns) = cli.test_file_patterns.filter(|p| !p.is_empty()) {
        config.test_file_patterns = patterns;
    }
    config
}
