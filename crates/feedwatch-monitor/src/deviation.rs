//! Relative deviation scoring.
//!
//! Deviation is measured in integer basis points against the round's
//! reference price:
//!
//! ```text
//! deviation_bps = |price - reference| * 10000 / reference
//! ```
//!
//! The division truncates. A feed is an outlier when its deviation
//! **strictly** exceeds the configured threshold; a feed sitting exactly on
//! the threshold is not flagged.

use serde::{Deserialize, Serialize};

use crate::aggregator::{self, ConsensusPolicy};
use crate::feed::{FeedId, FeedReading};
use crate::{ConfigError, MonitorError, Result};

/// Basis points in 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Largest accepted threshold (100%).
pub const MAX_THRESHOLD_BPS: u32 = 10_000;

/// A validated deviation threshold in basis points, `0 < bps <= 10000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Threshold(u32);

impl Threshold {
    /// Validate a threshold.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ThresholdOutOfRange`] if `bps` is 0 or above 10000
    pub fn new(bps: u32) -> std::result::Result<Self, ConfigError> {
        if bps == 0 || bps > MAX_THRESHOLD_BPS {
            return Err(ConfigError::ThresholdOutOfRange(bps));
        }
        Ok(Self(bps))
    }

    /// The threshold in basis points.
    pub fn bps(self) -> u32 {
        self.0
    }

    /// Whether `deviation_bps` strictly exceeds this threshold.
    pub fn is_exceeded_by(self, deviation_bps: u64) -> bool {
        deviation_bps > u64::from(self.0)
    }
}

impl TryFrom<u32> for Threshold {
    type Error = ConfigError;

    fn try_from(bps: u32) -> std::result::Result<Self, Self::Error> {
        Self::new(bps)
    }
}

impl From<Threshold> for u32 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

/// Deviation of `price` from `reference` in basis points.
///
/// Computed in `u128` and saturated to `u64::MAX`.
///
/// # Errors
///
/// - [`MonitorError::ConsensusUndefined`] if `reference` is zero
///
/// # Examples
///
/// ```
/// use feedwatch_monitor::deviation::deviation_bps;
///
/// assert_eq!(deviation_bps(105, 100).unwrap(), 500);
/// assert_eq!(deviation_bps(200, 100).unwrap(), 10_000);
/// assert!(deviation_bps(1, 0).is_err());
/// ```
pub fn deviation_bps(price: u64, reference: u64) -> Result<u64> {
    if reference == 0 {
        return Err(MonitorError::ConsensusUndefined);
    }
    let diff = price.abs_diff(reference) as u128;
    let bps = diff * BPS_DENOMINATOR as u128 / reference as u128;
    Ok(u64::try_from(bps).unwrap_or(u64::MAX))
}

/// A feed whose reading strictly exceeded the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outlier {
    /// The offending feed.
    pub feed: FeedId,
    /// Its reading this round.
    pub price: u64,
    /// The price it was compared against.
    pub reference: u64,
    /// Deviation in basis points.
    pub deviation_bps: u64,
}

/// Result of scoring one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Every feed was scored. `outliers` is in registry order.
    Scored {
        /// Inclusive median of the snapshot.
        consensus: u64,
        /// Feeds beyond threshold.
        outliers: Vec<Outlier>,
    },
    /// A reference price was zero, so no feed was scored.
    Degenerate {
        /// Inclusive median of the snapshot.
        consensus: u64,
    },
}

impl Evaluation {
    /// The inclusive median of the snapshot.
    pub fn consensus(&self) -> u64 {
        match self {
            Self::Scored { consensus, .. } | Self::Degenerate { consensus } => *consensus,
        }
    }

    /// Feeds beyond threshold. Empty for a degenerate snapshot.
    pub fn outliers(&self) -> &[Outlier] {
        match self {
            Self::Scored { outliers, .. } => outliers,
            Self::Degenerate { .. } => &[],
        }
    }

    /// Whether scoring was skipped.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}

/// Classifies each reading of a snapshot as normal or outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviationDetector {
    threshold: Threshold,
    policy: ConsensusPolicy,
}

impl DeviationDetector {
    /// Create a detector using the inclusive median.
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            policy: ConsensusPolicy::Inclusive,
        }
    }

    /// Replace the consensus policy.
    pub fn with_policy(mut self, policy: ConsensusPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured threshold.
    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// The configured consensus policy.
    pub fn policy(&self) -> ConsensusPolicy {
        self.policy
    }

    /// Score every reading against its reference price.
    ///
    /// If any reference resolves to zero the whole snapshot is reported as
    /// [`Evaluation::Degenerate`] and no outliers are produced.
    ///
    /// An empty snapshot evaluates as degenerate with a zero consensus.
    pub fn evaluate(&self, readings: &[FeedReading]) -> Evaluation {
        let prices: Vec<u64> = readings.iter().map(|r| r.price).collect();
        let Some(consensus) = aggregator::median(&prices) else {
            return Evaluation::Degenerate { consensus: 0 };
        };

        let mut outliers = Vec::new();
        for (index, reading) in readings.iter().enumerate() {
            let reference = aggregator::reference_for(self.policy, &prices, index, consensus);
            let deviation = match deviation_bps(reading.price, reference) {
                Ok(d) => d,
                Err(_) => return Evaluation::Degenerate { consensus },
            };
            tracing::trace!(
                feed = %reading.feed,
                price = reading.price,
                reference,
                deviation_bps = deviation,
                "scored feed"
            );
            if self.threshold.is_exceeded_by(deviation) {
                outliers.push(Outlier {
                    feed: reading.feed.clone(),
                    price: reading.price,
                    reference,
                    deviation_bps: deviation,
                });
            }
        }

        Evaluation::Scored {
            consensus,
            outliers,
        }
    }
}
