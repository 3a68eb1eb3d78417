//! The round state machine.
//!
//! Each call to [`OracleMonitor::check`] runs one complete round:
//!
//! ```text
//! Idle -> Sampling -> Evaluating -> Emitting -> Idle
//! ```
//!
//! 1. **Sampling**: every registered feed is read exactly once into an
//!    immutable snapshot. Feeds are never re-read during evaluation.
//! 2. **Evaluating**: the snapshot is aggregated and scored.
//! 3. **Emitting**: one [`AnomalyRecord`] per outlier is published to the sink.
//!
//! A round either completes or leaves no trace. If any feed read fails, the
//! round is abandoned before anything is published and the round counter does
//! not move, so retrying reuses the same round index.
//!
//! There is no suppression across rounds. A feed that stays manipulated is
//! reported again in every round it exceeds the threshold.
//!
//! `check` takes `&mut self`, so one monitor can only run one round at a time.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregator::ConsensusPolicy;
use crate::alert::{AlertSink, AnomalyRecord};
use crate::deviation::{DeviationDetector, Evaluation, Threshold};
use crate::feed::{FeedId, FeedReading, PriceFeed};
use crate::{ConfigError, MonitorError, Result};

/// Where the monitor is within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPhase {
    /// Between rounds.
    Idle,
    /// Reading feeds into the round snapshot.
    Sampling,
    /// Aggregating and scoring the snapshot.
    Evaluating,
    /// Publishing anomaly records.
    Emitting,
}

/// Outcome classification of a completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Every feed was within threshold.
    Clean,
    /// At least one feed exceeded threshold.
    Anomalous,
    /// The consensus was zero; scoring was skipped.
    Degenerate,
}

/// What a completed round produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Index of the round.
    pub round: u64,
    /// Median of the round's snapshot.
    pub consensus: u64,
    /// Outcome classification.
    pub status: RoundStatus,
    /// Records published this round, in registry order.
    pub anomalies: Vec<AnomalyRecord>,
}

impl RoundReport {
    /// Whether at least one anomaly was published this round.
    pub fn has_anomaly(&self) -> bool {
        !self.anomalies.is_empty()
    }

    /// Whether the round was degenerate.
    pub fn is_degenerate(&self) -> bool {
        self.status == RoundStatus::Degenerate
    }
}

/// Diagnostics accumulated over the monitor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Rounds that ran to completion.
    pub rounds_completed: u64,
    /// Total anomaly records published.
    pub anomalies_emitted: u64,
    /// Rounds with at least one anomaly.
    pub anomalous_rounds: u64,
    /// Rounds skipped because consensus was zero.
    pub degenerate_rounds: u64,
    /// Rounds abandoned on a feed read failure.
    pub failed_rounds: u64,
    /// Consensus of the most recent completed round.
    pub last_consensus: Option<u64>,
    /// Most recent round with an anomaly.
    pub last_anomaly_round: Option<u64>,
}

/// Cross-checks a fixed set of price feeds each round.
pub struct OracleMonitor<S> {
    feeds: Vec<Arc<dyn PriceFeed>>,
    detector: DeviationDetector,
    sink: S,
    round: u64,
    phase: MonitorPhase,
    stats: MonitorStats,
}

impl<S: AlertSink> OracleMonitor<S> {
    /// Create a monitor over `feeds` with a threshold in basis points.
    ///
    /// Feed order is fixed here and defines the order of anomaly records.
    /// A single feed is accepted but can never be flagged, since it is its own
    /// consensus.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyFeedSet`] if `feeds` is empty
    /// - [`ConfigError::DuplicateFeed`] if two feeds share an identifier
    /// - [`ConfigError::ThresholdOutOfRange`] if the threshold is not in `1..=10000`
    pub fn new(feeds: Vec<Arc<dyn PriceFeed>>, threshold_bps: u32, sink: S) -> Result<Self> {
        if feeds.is_empty() {
            return Err(ConfigError::EmptyFeedSet.into());
        }
        let mut seen = HashSet::with_capacity(feeds.len());
        for feed in &feeds {
            if !seen.insert(feed.id().clone()) {
                return Err(ConfigError::DuplicateFeed(feed.id().clone()).into());
            }
        }
        let threshold = Threshold::new(threshold_bps)?;

        if feeds.len() == 1 {
            tracing::warn!(
                feed = %feeds[0].id(),
                "single feed registered: it is its own consensus and can never be flagged"
            );
        }
        tracing::info!(
            feeds = feeds.len(),
            threshold_bps,
            "oracle monitor created"
        );

        Ok(Self {
            feeds,
            detector: DeviationDetector::new(threshold),
            sink,
            round: 0,
            phase: MonitorPhase::Idle,
            stats: MonitorStats::default(),
        })
    }

    /// Select how each feed's reference price is derived.
    pub fn with_policy(mut self, policy: ConsensusPolicy) -> Self {
        self.detector = self.detector.with_policy(policy);
        self
    }

    /// Run one full round.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::FeedRead`] if any feed fails to answer. Nothing is
    ///   published and the round index is not consumed.
    pub fn check(&mut self) -> Result<RoundReport> {
        let round = self.round;

        self.enter(MonitorPhase::Sampling);
        let snapshot = match self.snapshot(round) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.failed_rounds += 1;
                self.enter(MonitorPhase::Idle);
                tracing::error!(round, error = %e, "round abandoned");
                return Err(e);
            }
        };

        self.enter(MonitorPhase::Evaluating);
        let evaluation = self.detector.evaluate(&snapshot);
        let consensus = evaluation.consensus();
        let anomalies: Vec<AnomalyRecord> = evaluation
            .outliers()
            .iter()
            .map(|o| AnomalyRecord {
                round,
                feed_id: o.feed.clone(),
                observed_price: o.price,
                consensus_price: o.reference,
                deviation_bps: o.deviation_bps,
            })
            .collect();

        self.enter(MonitorPhase::Emitting);
        for record in &anomalies {
            self.sink.publish(record);
        }

        let status = match evaluation {
            Evaluation::Degenerate { .. } => RoundStatus::Degenerate,
            Evaluation::Scored { .. } if anomalies.is_empty() => RoundStatus::Clean,
            Evaluation::Scored { .. } => RoundStatus::Anomalous,
        };
        self.commit(round, consensus, status, anomalies.len() as u64);
        self.enter(MonitorPhase::Idle);

        Ok(RoundReport {
            round,
            consensus,
            status,
            anomalies,
        })
    }

    /// Read every feed once, in registry order.
    fn snapshot(&self, round: u64) -> Result<Vec<FeedReading>> {
        self.feeds
            .iter()
            .map(|feed| {
                let price = feed
                    .current_price()
                    .map_err(|source| MonitorError::FeedRead { round, source })?;
                Ok(FeedReading {
                    feed: feed.id().clone(),
                    price,
                    round,
                })
            })
            .collect()
    }

    fn commit(&mut self, round: u64, consensus: u64, status: RoundStatus, emitted: u64) {
        self.round += 1;
        self.stats.rounds_completed += 1;
        self.stats.last_consensus = Some(consensus);
        match status {
            RoundStatus::Clean => {
                tracing::debug!(round, consensus, "round clean");
            }
            RoundStatus::Anomalous => {
                self.stats.anomalies_emitted += emitted;
                self.stats.anomalous_rounds += 1;
                self.stats.last_anomaly_round = Some(round);
                tracing::info!(round, consensus, anomalies = emitted, "round anomalous");
            }
            RoundStatus::Degenerate => {
                self.stats.degenerate_rounds += 1;
                tracing::warn!(round, consensus, "degenerate round: consensus is zero, scoring skipped");
            }
        }
    }

    fn enter(&mut self, phase: MonitorPhase) {
        tracing::trace!(round = self.round, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }
}

impl<S> OracleMonitor<S> {
    /// Index the next round will carry. Equals the number of completed rounds.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Current phase. Always [`MonitorPhase::Idle`] between calls to `check`.
    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// Registered feed identifiers, in registry order.
    pub fn feed_ids(&self) -> impl Iterator<Item = &FeedId> {
        self.feeds.iter().map(|f| f.id())
    }

    /// Number of registered feeds.
    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// The configured threshold.
    pub fn threshold(&self) -> Threshold {
        self.detector.threshold()
    }

    /// The configured consensus policy.
    pub fn policy(&self) -> ConsensusPolicy {
        self.detector.policy()
    }

    /// Consensus of the most recent completed round.
    pub fn last_consensus(&self) -> Option<u64> {
        self.stats.last_consensus
    }

    /// Lifetime diagnostics.
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// The alert sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the alert sink, e.g. to drain it.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the monitor, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
