//! # feedwatch-sim
//!
//! Simulation harness for the oracle monitor.
//!
//! Drives a set of mock price feeds along a noisy random walk, injects a flash
//! spike on one feed, lets an attacker borrow against the manipulated price,
//! and measures how quickly the monitor notices.
//!
//! ## Modules
//!
//! - [`lending`] — Single-feed lending protocol (the victim)
//! - [`random_walk`] — Seeded true-price walk and noisy feed readings
//! - [`scenario`] — Flash-spike scenario runner and report

pub mod lending;
pub mod random_walk;
pub mod scenario;

use feedwatch_monitor::{FeedError, MonitorError};

/// Error types for simulation operations.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The monitor failed a round or could not be built.
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// The lending protocol could not read its feed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Borrow requested with nothing deposited.
    #[error("no collateral deposited")]
    NoCollateral,

    /// Arithmetic overflow in protocol accounting.
    #[error("overflow computing {0}")]
    Overflow(&'static str),

    /// Scenario parameters are inconsistent.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

/// Convenience result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
