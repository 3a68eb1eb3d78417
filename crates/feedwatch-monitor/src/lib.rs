//! # feedwatch-monitor
//!
//! Oracle-manipulation detection engine.
//!
//! The monitor samples every registered price feed once per round, derives a
//! consensus price from the snapshot, and flags each feed whose relative
//! deviation from that consensus strictly exceeds a threshold expressed in
//! basis points. Flagged feeds are published as [`AnomalyRecord`]s to an
//! [`AlertSink`] before [`OracleMonitor::check`] returns.
//!
//! ## Modules
//!
//! - [`feed`] — Price feed contract, feed identifiers, per-round readings
//! - [`aggregator`] — Median consensus and consensus policies
//! - [`deviation`] — Basis-point deviation scoring and outlier detection
//! - [`monitor`] — The round state machine
//! - [`alert`] — Anomaly records and alert sinks

pub mod aggregator;
pub mod alert;
pub mod deviation;
pub mod feed;
pub mod monitor;

pub use aggregator::ConsensusPolicy;
pub use alert::{AlertSink, AnomalyRecord, FnSink, RecordingSink, TracingSink};
pub use deviation::{DeviationDetector, Threshold, BPS_DENOMINATOR};
pub use feed::{FeedError, FeedId, FeedReading, MockPriceFeed, PriceFeed};
pub use monitor::{MonitorPhase, MonitorStats, OracleMonitor, RoundReport, RoundStatus};

/// Invalid construction parameters. Fatal, never recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No feeds were registered.
    #[error("feed registry is empty")]
    EmptyFeedSet,

    /// The same feed identifier was registered twice.
    #[error("duplicate feed identifier: {0}")]
    DuplicateFeed(FeedId),

    /// Threshold outside `(0, 10000]` basis points.
    #[error("threshold out of range: {0} bps (expected 1..=10000)")]
    ThresholdOutOfRange(u32),
}

/// Error types for monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The monitor could not be constructed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A feed could not be read; the round was abandoned.
    #[error("round {round} aborted: {source}")]
    FeedRead {
        /// Index of the round that failed.
        round: u64,
        /// Underlying feed failure.
        #[source]
        source: FeedError,
    },

    /// The consensus resolved to zero, so relative deviation is undefined.
    #[error("consensus is zero; deviation is undefined")]
    ConsensusUndefined,
}

/// Convenience result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
