//! Small shared helpers

pub mod paths;

pub use paths::{absolute_in, normalize_path, relative_to};
