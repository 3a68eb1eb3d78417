//! A lending protocol that prices everything from exactly one feed.
//!
//! This is the consumer the monitor exists to protect. It has no knowledge of
//! the other feeds and no circuit breaker: if its feed is spiked, it will lend
//! against the spiked price.

use std::sync::Arc;

use feedwatch_monitor::{PriceFeed, BPS_DENOMINATOR};

use crate::{Result, SimError};

/// Default loan-to-value: 100%.
pub const DEFAULT_LTV_BPS: u64 = 10_000;

/// Collateral in, loan out, priced from a single feed.
pub struct SimpleLendingProtocol {
    feed: Arc<dyn PriceFeed>,
    ltv_bps: u64,
    collateral: u64,
    debt: u64,
}

impl SimpleLendingProtocol {
    /// Create a protocol reading `feed`.
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            ltv_bps: DEFAULT_LTV_BPS,
            collateral: 0,
            debt: 0,
        }
    }

    /// Set the loan-to-value ratio in basis points.
    pub fn with_ltv(mut self, ltv_bps: u64) -> Self {
        self.ltv_bps = ltv_bps;
        self
    }

    /// Deposit `amount` units of collateral.
    ///
    /// Returns the value of the deposit at the feed's current price.
    pub fn deposit_collateral(&mut self, amount: u64) -> Result<u64> {
        let price = self.feed.current_price()?;
        self.collateral = self
            .collateral
            .checked_add(amount)
            .ok_or(SimError::Overflow("collateral"))?;
        let value = amount
            .checked_mul(price)
            .ok_or(SimError::Overflow("collateral value"))?;
        tracing::debug!(feed = %self.feed.id(), amount, price, value, "collateral deposited");
        Ok(value)
    }

    /// Borrow the full remaining limit at the feed's current price.
    ///
    /// Returns the amount newly borrowed, zero if the limit is already used.
    pub fn borrow(&mut self) -> Result<u64> {
        if self.collateral == 0 {
            return Err(SimError::NoCollateral);
        }
        let price = self.feed.current_price()?;
        let limit = self.borrow_limit_at(price)?;
        let amount = limit.saturating_sub(self.debt);
        self.debt += amount;
        tracing::info!(
            feed = %self.feed.id(),
            price,
            limit,
            amount,
            "borrowed against single-feed price"
        );
        Ok(amount)
    }

    /// Borrow limit for the current collateral at `price`.
    pub fn borrow_limit_at(&self, price: u64) -> Result<u64> {
        let gross = (self.collateral as u128)
            .checked_mul(price as u128)
            .and_then(|v| v.checked_mul(self.ltv_bps as u128))
            .ok_or(SimError::Overflow("borrow limit"))?;
        u64::try_from(gross / BPS_DENOMINATOR as u128)
            .map_err(|_| SimError::Overflow("borrow limit"))
    }

    /// Collateral units deposited.
    pub fn collateral(&self) -> u64 {
        self.collateral
    }

    /// Outstanding debt.
    pub fn debt(&self) -> u64 {
        self.debt
    }
}
