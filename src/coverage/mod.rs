//! Coverage normalization, filtering and per-test deltas

pub mod codec;
pub mod diff;
pub mod filter;

pub use codec::normalize;
pub use diff::{diff, CoverageDiffEngine, TestDelta};
pub use filter::{CollectionFilter, FilterReason, FilterReport};
