//! Select command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use super::utils::{explain, parse_csv, Workspace};
use crate::config::CliOverrides;
use crate::select::{render, select_tests, OutputFormat, RunnerRegistry, Selection, TestFileMatcher};
use crate::vcs::{Revision, VcsRegistry};

#[derive(Args)]
pub struct SelectArgs {
    /// Revision to compare the working tree against
    #[arg(short = 'r', long, value_name = "REV", default_value = "last_commit")]
    pub revision: String,

    /// Output format: list, test-runner or json
    #[arg(short = 'f', long, value_name = "FORMAT", default_value = "list")]
    pub format: String,

    /// Run the selected tests instead of printing them
    #[arg(short = 'e', long)]
    pub exec: bool,

    /// Path to config file (covet.toml or covet.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run log to read (default: run_log.json in the repository root)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Index of the run log
    #[arg(long, value_name = "FILE")]
    pub index_file: Option<PathBuf>,

    /// Test runner used for the test-runner format: minitest or rspec
    #[arg(long, value_name = "NAME")]
    pub test_runner: Option<String>,

    /// Version control system to read changes from
    #[arg(long, value_name = "NAME")]
    pub vcs: Option<String>,

    /// Unchanged lines around each change that also count as changed
    #[arg(long, value_name = "N")]
    pub context_lines: Option<u32>,

    /// Test directories (comma-separated)
    #[arg(long, value_name = "DIRS")]
    pub test_dirs: Option<String>,
}

pub fn run(args: SelectArgs) -> Result<ExitCode> {
    let format: OutputFormat = args.format.parse()?;
    let overrides = CliOverrides {
        vcs: args.vcs.clone(),
        test_runner: args.test_runner.clone(),
        log_file: args.log_file.clone(),
        index_file: args.index_file.clone(),
        context_lines: args.context_lines,
        test_directories: parse_csv(&args.test_dirs),
        ..CliOverrides::default()
    };
    let workspace = Workspace::load(args.config.as_deref(), overrides)?;
    let config = &workspace.config;

    let vcs = VcsRegistry::default().resolve(&config.vcs, &workspace.root, config)?;
    let runners = RunnerRegistry::default();
    let runner = runners.resolve(&config.test_runner)?;
    let matcher = TestFileMatcher::new(&config.test_directories, &config.test_file_patterns)?;
    let revision = Revision::from(args.revision.as_str());

    let reader = workspace.reader();
    let selection = select_tests(vcs.as_ref(), &revision, &reader, &matcher, &workspace.root)
        .map_err(explain)?;

    if !args.exec {
        println!("{}", render(&selection, format, runner)?);
        return Ok(ExitCode::SUCCESS);
    }

    let command = match &selection {
        Selection::AllTestFiles { test_files, .. } if !test_files.is_empty() => {
            runner.command_for_all(test_files)
        }
        Selection::RunList(list) if !list.is_empty() => runner.command_for(list),
        _ => {
            println!("{}", render(&selection, OutputFormat::List, runner)?);
            return Ok(ExitCode::SUCCESS);
        }
    };
    println!("{command}");

    let status = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .current_dir(&workspace.root)
        .status()
        .with_context(|| format!("Failed to run: {command}"))?;
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
