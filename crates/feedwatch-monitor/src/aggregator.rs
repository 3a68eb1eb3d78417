//! Consensus price aggregation.
//!
//! The consensus for a round is the **median** of the snapshot's prices. A
//! single manipulated feed can move a mean arbitrarily far, but it can move the
//! median by at most one rank, so an attacker has to corrupt a majority of the
//! feeds to drag the consensus along. That is the anti-manipulation property
//! the whole detector rests on.
//!
//! ## Tie-break
//!
//! For an even number of prices the consensus is the element at index
//! `n / 2` of the ascending sort (0-indexed). Prices are never averaged, so the
//! consensus is always one of the observed readings and stays an integer.
//!
//! ```text
//! [10, 20, 30]      -> 20
//! [10, 20, 30, 40]  -> 30
//! ```
//!
//! ## Single feed
//!
//! With one feed the consensus is that feed's own price, so its deviation is
//! always zero and nothing can ever be flagged.

use serde::{Deserialize, Serialize};

/// Which readings a feed is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusPolicy {
    /// Compare every feed to the median of all readings, its own included.
    #[default]
    Inclusive,
    /// Compare each feed to the median of the other readings.
    LeaveOneOut,
}

/// Median of `prices` under the `n / 2` tie-break. `None` when empty.
///
/// The result does not depend on the order of `prices`.
///
/// # Examples
///
/// ```
/// use feedwatch_monitor::aggregator::median;
///
/// assert_eq!(median(&[30, 10, 20]), Some(20));
/// assert_eq!(median(&[40, 10, 30, 20]), Some(30));
/// assert_eq!(median(&[]), None);
/// ```
pub fn median(prices: &[u64]) -> Option<u64> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied()
}

/// Median of `prices` with the element at `skip` removed.
///
/// When an even number of readings remains, the two middle readings are
/// compared against `anchor` and the nearer one wins; an exact tie goes to
/// index `n / 2`. With `anchor` set to the inclusive consensus, a single
/// spiked reading never becomes the reference for the honest feeds, whichever
/// direction it moved.
///
/// Returns `None` when nothing is left.
pub fn median_excluding(prices: &[u64], skip: usize, anchor: u64) -> Option<u64> {
    let mut others: Vec<u64> = prices
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(_, p)| *p)
        .collect();
    if others.is_empty() {
        return None;
    }
    others.sort_unstable();

    let upper = others[others.len() / 2];
    if others.len() % 2 == 1 {
        return Some(upper);
    }
    let lower = others[others.len() / 2 - 1];
    if lower.abs_diff(anchor) < upper.abs_diff(anchor) {
        Some(lower)
    } else {
        Some(upper)
    }
}

/// Reference price for the feed at `index` under `policy`.
///
/// `LeaveOneOut` with a single feed has no other readings to compare against
/// and falls back to the inclusive consensus.
pub fn reference_for(
    policy: ConsensusPolicy,
    prices: &[u64],
    index: usize,
    consensus: u64,
) -> u64 {
    match policy {
        ConsensusPolicy::Inclusive => consensus,
        ConsensusPolicy::LeaveOneOut => {
            median_excluding(prices, index, consensus).unwrap_or(consensus)
        }
    }
}
