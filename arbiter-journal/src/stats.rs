//! Aggregate statistics over persisted resolutions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::ConflictLogEntry;

const TOP_PAIR_LIMIT: usize = 5;

/// Occurrence count for an unordered perspective pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCount {
    /// Pair key: both identifiers sorted and joined with `+`.
    pub pair: String,
    /// Number of conflicts the pair took part in.
    pub count: usize,
}

/// Summary of the audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictStats {
    /// Number of entries.
    pub total: usize,
    /// Mean resolution time in milliseconds (0 when empty).
    pub average_resolution_ms: f64,
    /// Entry counts keyed by strategy label.
    pub by_strategy: BTreeMap<String, usize>,
    /// Conflict counts keyed by unordered perspective pair.
    pub by_pair: BTreeMap<String, usize>,
    /// The most frequent pairs, most frequent first.
    pub top_pairs: Vec<PairCount>,
}

impl ConflictStats {
    /// Computes statistics over the supplied entries.
    #[must_use]
    pub fn from_entries(entries: &[ConflictLogEntry]) -> Self {
        if entries.is_empty() {
            return Self::default();
        }

        let mut by_strategy = BTreeMap::new();
        let mut by_pair = BTreeMap::new();
        let mut total_ms = 0.0;

        for entry in entries {
            total_ms += entry.resolution_time_ms;
            *by_strategy
                .entry(entry.strategy.as_str().to_owned())
                .or_insert(0) += 1;

            for conflict in &entry.conflicts {
                let participants = conflict.participants();
                for (index, left) in participants.iter().enumerate() {
                    for right in &participants[index + 1..] {
                        *by_pair.entry(pair_key(left.as_str(), right.as_str())).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut top_pairs: Vec<PairCount> = by_pair
            .iter()
            .map(|(pair, count)| PairCount {
                pair: pair.clone(),
                count: *count,
            })
            .collect();
        // BTreeMap iteration already orders keys, so a stable sort keeps ties by key.
        top_pairs.sort_by(|a, b| b.count.cmp(&a.count));
        top_pairs.truncate(TOP_PAIR_LIMIT);

        #[allow(clippy::cast_precision_loss)]
        let average_resolution_ms = total_ms / entries.len() as f64;

        Self {
            total: entries.len(),
            average_resolution_ms,
            by_strategy,
            by_pair,
            top_pairs,
        }
    }
}

fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}+{b}")
    } else {
        format!("{b}+{a}")
    }
}
