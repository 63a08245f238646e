// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// A single ballot: `address` chose candidate `index` in session `session_id`.
///
/// Votes are never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The voting round.
    pub session_id: SessionId,
    /// Lowercased voter wallet address.
    pub address: String,
    /// Index of the chosen candidate.
    pub index: u64,
    /// Unix time in milliseconds at which the vote was accepted.
    pub timestamp: u64,
}

impl Display for Vote {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]{} -> {} @{}",
            self.session_id, self.address, self.index, self.timestamp
        )
    }
}

/// Per-session vote counts keyed by candidate index.
pub type Tally = BTreeMap<u64, u64>;

/// The outcome of a session so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WinnerResult {
    /// The leading candidate, `None` when nobody has voted.
    pub winning_index: Option<u64>,
    /// Counts for every candidate that received at least one vote.
    pub counts: Tally,
}

impl WinnerResult {
    /// Picks the leading index of a tally. On equal counts the lowest index
    /// wins.
    pub fn from_tally(counts: Tally) -> WinnerResult {
        let mut winning: Option<(u64, u64)> = None;
        // BTreeMap iterates in ascending index order, so a strict comparison
        // keeps the lowest index among equals.
        for (&index, &count) in &counts {
            match winning {
                Some((_, best)) if count <= best => {}
                _ => winning = Some((index, count)),
            }
        }
        WinnerResult {
            winning_index: winning.map(|(index, _)| index),
            counts,
        }
    }

    /// True if no vote has been cast.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of votes behind this result.
    pub fn total_votes(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Canonical form of a voter address: surrounding whitespace removed, lowercase.
///
/// Returns `None` for an address that is empty after trimming.
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}
