//! Primary/fallback source dispatching
//!
//! Chooses between two price pipelines with a sticky one-way latch: once
//! the primary times out and the dispatcher switches to the fallback, it
//! never switches back, even if the primary recovers. This avoids flapping
//! between sources.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::feed::PriceFeed;

/// Which pipeline serves prices. `Fallback` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    Primary,
    Fallback,
}

impl DispatchState {
    /// The only legal transition: `Primary -> Fallback`. Latching an
    /// already-latched dispatcher is a no-op.
    pub fn latch_fallback(&mut self) {
        *self = DispatchState::Fallback;
    }

    pub fn is_primary(self) -> bool {
        self == DispatchState::Primary
    }
}

/// Sticky two-source failover over a primary and optional fallback feed.
pub struct SourceDispatcher {
    primary: PriceFeed,
    fallback: Option<PriceFeed>,
    state: RwLock<DispatchState>,
}

impl SourceDispatcher {
    pub fn new(primary: PriceFeed, fallback: Option<PriceFeed>) -> Self {
        Self {
            primary,
            fallback,
            state: RwLock::new(DispatchState::Primary),
        }
    }

    pub fn state(&self) -> DispatchState {
        *self.state.read()
    }

    pub fn primary(&self) -> &PriceFeed {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&PriceFeed> {
        self.fallback.as_ref()
    }

    /// Record on the chosen pipeline and return its scaled price,
    /// latching to the fallback once the primary times out.
    ///
    /// The primary's price is always computed first, keeping its cache
    /// warm and making it the answer whenever no fallback is configured.
    pub fn dispatch_price(&self, interval: u64, now: u64) -> Result<u128> {
        let primary_price = self.primary.record_and_cache(interval, now)?;
        if self.state().is_primary() && !self.primary.is_stale(now) {
            return Ok(primary_price);
        }
        match &self.fallback {
            Some(fallback) => {
                {
                    let mut state = self.state.write();
                    if state.is_primary() {
                        warn!(
                            primary = self.primary.name(),
                            fallback = fallback.name(),
                            "primary source timed out, latching to fallback"
                        );
                        state.latch_fallback();
                    }
                }
                fallback.record_and_cache(interval, now)
            }
            // No fallback configured: the primary is authoritative even
            // when stale; callers check `is_stale` separately.
            None => Ok(primary_price),
        }
    }

    /// Same decision rule as `dispatch_price` but read-only: no fetching,
    /// no recording, and no latching.
    pub fn peek_dispatched_price(&self, interval: u64, now: u64) -> Result<u128> {
        let primary_price = self.primary.read_cached_twap(interval, now)?;
        if self.state().is_primary() && !self.primary.is_stale(now) {
            return Ok(primary_price);
        }
        match &self.fallback {
            Some(fallback) => fallback.read_cached_twap(interval, now),
            None => Ok(primary_price),
        }
    }
}
