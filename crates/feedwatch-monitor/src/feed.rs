//! Price feed contract and per-round readings.
//!
//! A feed is an independent, trusted-but-unreliable source reporting the price
//! of one asset in fixed-point integer units. The monitor only ever reads
//! feeds; setting prices belongs to whoever owns the feed.
//!
//! [`MockPriceFeed`] is a plain setter/getter feed used by the simulation
//! harness and tests. Cloned handles share the same price, so a harness can
//! keep one handle while the monitor holds another.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a registered feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    /// Create a feed identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FeedId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Failure to read a feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The feed did not answer.
    #[error("feed unavailable: {feed}")]
    Unavailable {
        /// The feed that failed.
        feed: FeedId,
    },

    /// The feed answered with something unusable.
    #[error("feed {feed} returned invalid data: {reason}")]
    InvalidData {
        /// The feed that failed.
        feed: FeedId,
        /// Human-readable reason.
        reason: String,
    },
}

/// A single source exposing its latest price.
pub trait PriceFeed: Send + Sync {
    /// Identifier used in the monitor's registry and in anomaly records.
    fn id(&self) -> &FeedId;

    /// The latest price set on this feed.
    fn current_price(&self) -> Result<u64, FeedError>;
}

impl<F: PriceFeed + ?Sized> PriceFeed for Arc<F> {
    fn id(&self) -> &FeedId {
        (**self).id()
    }

    fn current_price(&self) -> Result<u64, FeedError> {
        (**self).current_price()
    }
}

/// One feed's price as captured for a round. Immutable once taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedReading {
    /// Feed the price was read from.
    pub feed: FeedId,
    /// Observed price in fixed-point units.
    pub price: u64,
    /// Round the reading belongs to.
    pub round: u64,
}

#[derive(Debug)]
struct MockState {
    price: AtomicU64,
    available: AtomicBool,
}

/// Shareable in-memory feed with a settable price.
#[derive(Debug, Clone)]
pub struct MockPriceFeed {
    id: FeedId,
    state: Arc<MockState>,
}

impl MockPriceFeed {
    /// Create a feed reporting `price`.
    pub fn new(id: impl Into<FeedId>, price: u64) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(MockState {
                price: AtomicU64::new(price),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Overwrite the reported price. Visible to every clone of this handle.
    pub fn set_price(&self, price: u64) {
        tracing::trace!(feed = %self.id, price, "mock feed: price set");
        self.state.price.store(price, Ordering::SeqCst);
    }

    /// The price currently stored, regardless of availability.
    pub fn price(&self) -> u64 {
        self.state.price.load(Ordering::SeqCst)
    }

    /// Toggle availability. An unavailable feed fails every read.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }
}

impl PriceFeed for MockPriceFeed {
    fn id(&self) -> &FeedId {
        &self.id
    }

    fn current_price(&self) -> Result<u64, FeedError> {
        if !self.state.available.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable {
                feed: self.id.clone(),
            });
        }
        Ok(self.price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_feed_reports_initial_price() {
        let feed = MockPriceFeed::new("feed-a", 100);
        assert_eq!(feed.current_price().expect("read"), 100);
        assert_eq!(feed.id().as_str(), "feed-a");
    }

    #[test]
    fn test_clones_share_price() {
        let feed = MockPriceFeed::new("feed-a", 100);
        let handle = feed.clone();
        handle.set_price(250);
        assert_eq!(feed.current_price().expect("read"), 250);
    }

    #[test]
    fn test_unavailable_feed_fails_read() {
        let feed = MockPriceFeed::new("feed-a", 100);
        feed.set_available(false);
        let err = feed.current_price().expect_err("should fail");
        assert_eq!(
            err,
            FeedError::Unavailable {
                feed: FeedId::new("feed-a")
            }
        );

        feed.set_available(true);
        assert_eq!(feed.current_price().expect("read"), 100);
    }

    #[test]
    fn test_arc_dyn_feed() {
        let feed: Arc<dyn PriceFeed> = Arc::new(MockPriceFeed::new("feed-b", 7));
        assert_eq!(feed.id(), &FeedId::new("feed-b"));
        assert_eq!(feed.current_price().expect("read"), 7);
    }

    #[test]
    fn test_feed_id_serializes_as_string() {
        let json = serde_json::to_string(&FeedId::new("feed-c")).expect("serialize");
        assert_eq!(json, "\"feed-c\"");
    }
}
