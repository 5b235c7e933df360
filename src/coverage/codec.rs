//! Compact representation of coverage snapshots
//!
//! The probe hands back a counter array per file where the index is the line
//! number minus one. Only executed lines matter for selection, so snapshots
//! are stored sparsely.

use crate::domain::{CoverageSnapshot, LineCounts, RawSnapshot};

/// Turn a raw counter array snapshot into `file -> {line -> count}` keeping
/// only lines that executed at least once.
///
/// Files with no executed lines keep an empty entry so that a later snapshot
/// can still be compared against them.
pub fn normalize(raw: &RawSnapshot) -> CoverageSnapshot {
    raw.iter()
        .map(|(file, counters)| {
            let lines: LineCounts = counters
                .iter()
                .enumerate()
                .filter_map(|(idx, count)| match count {
                    Some(n) if *n > 0 => Some((idx as u32 + 1, *n as i64)),
                    _ => None,
                })
                .collect();
            (file.clone(), lines)
        })
        .collect()
}

/// Drop zero-count lines from an already sparse snapshot.
///
/// `compact(normalize(x)) == normalize(x)` for every raw snapshot.
pub fn compact(snapshot: &CoverageSnapshot) -> CoverageSnapshot {
    snapshot
        .iter()
        .map(|(file, lines)| {
            let kept =
                lines.iter().filter(|(_, count)| **count > 0).map(|(l, c)| (*l, *c)).collect();
            (file.clone(), kept)
        })
        .collect()
}

/// Expand a sparse snapshot back into counter arrays. Unexecuted lines below
/// the highest executed one become `None`.
pub fn expand(snapshot: &CoverageSnapshot) -> RawSnapshot {
    snapshot
        .iter()
        .map(|(file, lines)| {
            let len = lines.keys().next_back().copied().unwrap_or(0) as usize;
            let mut counters = vec![None; len];
            for (line, count) in lines {
                if *line >= 1 && *count > 0 {
                    counters[*line as usize - 1] = Some(*count as u64);
                }
            }
            (file.clone(), counters)
        })
        .collect()
}

/// Number of executed lines across all files.
pub fn executed_lines(snapshot: &CoverageSnapshot) -> usize {
    snapshot.values().map(|lines| lines.len()).sum()
}
