//! Stats command implementation

use anyhow::Result;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

use super::utils::{explain, Workspace};
use crate::config::CliOverrides;
use crate::domain::LogRecord;

#[derive(Args)]
pub struct StatsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to config file (covet.toml or covet.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run log to read (default: run_log.json in the repository root)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Index of the run log
    #[arg(long, value_name = "FILE")]
    pub index_file: Option<PathBuf>,
}

pub fn run(args: StatsArgs) -> Result<ExitCode> {
    let overrides = CliOverrides {
        log_file: args.log_file.clone(),
        index_file: args.index_file.clone(),
        ..CliOverrides::default()
    };
    let workspace = Workspace::load(args.config.as_deref(), overrides)?;
    let reader = workspace.reader();

    if !reader.exists() {
        println!("# No run log at {}", reader.log_path().display());
        return Ok(ExitCode::SUCCESS);
    }

    // The stats record is last and the base record first, so neither read
    // scans the log.
    let stats = match reader.load_record(-1).map_err(explain)? {
        Some(LogRecord::Stats(stats)) => Some(stats),
        _ => None,
    };
    let metadata = match reader.load_record(0).map_err(explain)? {
        Some(LogRecord::Base { metadata, .. }) => Some(metadata),
        _ => None,
    };

    if args.json {
        println!("{}", json!({ "stats": stats, "metadata": metadata }));
        return Ok(ExitCode::SUCCESS);
    }

    println!("Run log: {}", reader.log_path().display());
    if let Some(metadata) = &metadata {
        println!("Version: {}", metadata.version);
        println!("Test order: {}", metadata.options.test_order);
        if let Some(seed) = metadata.seed {
            println!("Seed: {seed}");
        }
    }
    match &stats {
        Some(stats) => {
            println!("Tests run: {}", stats.tests_run);
            println!("Tests logged: {}", stats.tests_logged);
            println!("Tests without coverage: {}", stats.tests_skipped);
            if let Some(finished) = stats.finished_at {
                println!("Finished: {}", finished.to_rfc3339());
            }
            println!("Elapsed: {:.3}s", stats.elapsed_seconds);
            for (reason, count) in &stats.filtered {
                println!("Filtered ({reason}): {count} file(s)");
            }
        }
        None => println!("# No stats record; the log predates stats collection"),
    }
    Ok(ExitCode::SUCCESS)
}
