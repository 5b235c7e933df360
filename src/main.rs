//! covet: run only the tests affected by your changes

use anyhow::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    covet::cli::run()
}
