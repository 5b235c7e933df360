//! Command-line interface for covet
//!
//! Provides `select`, `record` and `stats` subcommands.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod record;
mod select;
mod stats;
mod utils;

/// Run only the tests affected by your changes
#[derive(Parser)]
#[command(name = "covet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or run the tests covering lines changed since a revision
    Select(select::SelectArgs),

    /// Build the run log from a stream of test execution events
    Record(record::RecordArgs),

    /// Summarize the last collection run
    Stats(stats::StatsArgs),
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Select(args) => select::run(args),
        Commands::Record(args) => record::run(args),
        Commands::Stats(args) => stats::run(args),
    }
}
