//! Record command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use super::utils::{explain, Workspace};
use crate::collect::{replay_events, CollectionSession, ReplayProbe};
use crate::config::CliOverrides;
use crate::coverage::{CollectionFilter, CoverageDiffEngine};
use crate::log::LogWriter;

#[derive(Args)]
pub struct RecordArgs {
    /// JSON-lines event stream to replay (default: stdin)
    #[arg(long, value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Test ordering of the recorded run: random, random_seeded or ordered
    #[arg(long, value_name = "POLICY")]
    pub test_order: Option<String>,

    /// Seed the recorded run was ordered with
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Records buffered before each write to disk
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Path to config file (covet.toml or covet.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run log to write (default: run_log.json in the repository root)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Index of the run log
    #[arg(long, value_name = "FILE")]
    pub index_file: Option<PathBuf>,
}

pub fn run(args: RecordArgs) -> Result<ExitCode> {
    let overrides = CliOverrides {
        test_order: args.test_order.clone(),
        seed: args.seed,
        batch_size: args.batch_size,
        log_file: args.log_file.clone(),
        index_file: args.index_file.clone(),
        ..CliOverrides::default()
    };
    let workspace = Workspace::load(args.config.as_deref(), overrides)?;
    let config = &workspace.config;

    let options = config.run_options()?;
    let filter = CollectionFilter::from_config(&config.filter)?;
    let engine = CoverageDiffEngine::new(options.test_order, filter);
    let writer = LogWriter::new(workspace.log_path(), workspace.index_path())
        .batch_size(config.batch_size);
    let mut session = CollectionSession::new(ReplayProbe::default(), engine, writer, options)
        .seed(config.seed);

    let summary = match &args.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open event stream: {}", path.display()))?;
            replay_events(BufReader::new(file), &mut session)
        }
        None => replay_events(io::stdin().lock(), &mut session),
    }
    .map_err(explain)?;

    if summary.written {
        eprintln!(
            "Logged {} of {} tests to {}",
            session.tests_logged(),
            summary.tests,
            workspace.log_path().display()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Collection did not complete; run log left unchanged");
        Ok(ExitCode::FAILURE)
    }
}
