//! covet: test impact analysis from per-test line coverage
//!
//! Collection records, for every test, the lines it executed on top of a
//! baseline. Selection joins the lines changed since a revision against that
//! log to decide which tests have to run.

pub mod cli;
pub mod collect;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod error;
pub mod log;
pub mod select;
pub mod utils;
pub mod vcs;

pub use error::{CovetError, Result};
