//! Which (channel, period) pairs still need a verified commit.
//!
//! A wanted period counts as covered when some record of the channel lies inside the
//! period widened by half the frequency on each side and its commit reached a terminal
//! state. The tolerance lets a re-run with shifted boundaries reuse earlier work.

use std::collections::HashMap;

use history_ingestor::models::channel::Channel;

use crate::{
    period::{Frequency, Period},
    storage::CoverageRecord,
};

/// Lists uncovered `(channel, period)` pairs of `target` sliced by `frequency`.
///
/// Channels come out in reverse declaration order (duplicates dropped); periods are
/// chronological within a channel. Channels missing from `coverage` have no records.
pub fn missing(
    channels: &[Channel],
    coverage: &HashMap<Channel, Vec<CoverageRecord>>,
    target: Period,
    frequency: Frequency,
) -> Vec<(Channel, Period)> {
    let wanted: Vec<Period> = target.slice(frequency).collect();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut ordered = channels.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    ordered.dedup();

    let tolerance = frequency.half();
    let mut out = Vec::new();
    for channel in ordered {
        let records = coverage.get(&channel).map(Vec::as_slice).unwrap_or_default();
        for w in &wanted {
            let window = w.widen(tolerance);
            let covered = records
                .iter()
                .any(|r| r.state.is_terminal() && window.contains(&r.period));
            if !covered {
                out.push((channel, *w));
            }
        }
    }
    out
}
