//! Time-weighted average price accumulator
//!
//! Maintains a small bounded history of price observations and computes an
//! interval-weighted average over it. Each observation's price is treated
//! as constant from its own timestamp until the next-newer observation
//! (the newest one runs to the query time). All arithmetic is integer
//! fixed-point with u128 intermediates; no floating point.

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};

/// Maximum number of retained observations. Sized for the widest supported
/// query window at the expected update cadence; older entries are evicted
/// once newer ones guarantee interval coverage.
pub const MAX_OBSERVATIONS: usize = 32;

/// A single recorded price reading. Immutable once recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub price: u128,
    pub timestamp: u64,
}

/// Ring buffer of observations with strictly increasing timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapAccumulator {
    observations: [Observation; MAX_OBSERVATIONS],
    /// Next write position
    index: usize,
    count: usize,
    last_timestamp: u64,
    /// Timestamp of the very first observation ever recorded; the average
    /// divisor never reaches back past it.
    first_timestamp: u64,
}

impl Default for TwapAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TwapAccumulator {
    pub fn new() -> Self {
        Self {
            observations: [Observation::default(); MAX_OBSERVATIONS],
            index: 0,
            count: 0,
            last_timestamp: 0,
            first_timestamp: 0,
        }
    }

    /// Append an observation. Timestamps must be strictly increasing; a
    /// duplicate is a precondition violation, not a silent overwrite,
    /// because a zero-duration weighting interval is undefined.
    pub fn record(&mut self, price: u128, timestamp: u64) -> Result<()> {
        if self.count > 0 && timestamp <= self.last_timestamp {
            return Err(OracleError::DuplicateTimestamp {
                last: self.last_timestamp,
                got: timestamp,
            });
        }
        if self.count == 0 {
            self.first_timestamp = timestamp;
        }
        self.observations[self.index] = Observation { price, timestamp };
        self.index = (self.index + 1) % MAX_OBSERVATIONS;
        if self.count < MAX_OBSERVATIONS {
            self.count += 1;
        }
        self.last_timestamp = timestamp;
        Ok(())
    }

    /// Time-weighted average over `[current_time - interval, current_time]`.
    ///
    /// `interval == 0` disables averaging and returns `current_price`, as
    /// does an accumulator that has never recorded anything. When the
    /// retained history does not reach the window start, the earliest
    /// retained price is extended backward; a TWAP is always computable
    /// from the only known price.
    pub fn twap(&self, interval: u64, current_price: u128, current_time: u64) -> Result<u128> {
        if interval == 0 || self.count == 0 {
            return Ok(current_price);
        }

        let window_start = current_time.saturating_sub(interval);
        // The divisor shrinks to the actual covered duration when the
        // window predates the first observation ever recorded.
        let effective_start = window_start.max(self.first_timestamp);
        let duration = current_time.saturating_sub(effective_start);
        if duration == 0 {
            return Ok(current_price);
        }

        let mut sum: u128 = 0;
        let mut seg_end = current_time;
        let mut oldest = self.newest_back(0);

        for i in 0..self.count {
            let obs = self.newest_back(i);
            oldest = obs;
            let seg_start = obs.timestamp.max(effective_start);
            if seg_start < seg_end {
                sum = weighted_add(sum, obs.price, (seg_end - seg_start) as u128)?;
            }
            if obs.timestamp <= effective_start {
                seg_end = effective_start;
                break;
            }
            seg_end = seg_end.min(obs.timestamp);
        }

        // Retained history fell short of the window start: the earliest
        // available price covers the remainder.
        if seg_end > effective_start {
            sum = weighted_add(sum, oldest.price, (seg_end - effective_start) as u128)?;
        }

        Ok(sum / duration as u128)
    }

    /// Timestamp of the most recently recorded observation, if any.
    pub fn last_timestamp(&self) -> Option<u64> {
        (self.count > 0).then_some(self.last_timestamp)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Observation `i` steps back from the newest.
    fn newest_back(&self, i: usize) -> Observation {
        debug_assert!(i < self.count);
        let pos = (self.index + MAX_OBSERVATIONS - 1 - i) % MAX_OBSERVATIONS;
        self.observations[pos]
    }
}

fn weighted_add(sum: u128, price: u128, weight: u128) -> Result<u128> {
    let weighted = price
        .checked_mul(weight)
        .ok_or(OracleError::Overflow("twap weighted sum"))?;
    sum.checked_add(weighted)
        .ok_or(OracleError::Overflow("twap weighted sum"))
}
