//! Outlier detection and freeze classification
//!
//! Classifies each upstream quote against the last accepted reading and a
//! periodically-refreshed sampled baseline. Rejections are data, not
//! errors: every quote maps to exactly one `FreezeReason`. Outliers that
//! persist past the cooldown are absorbed one bounded correction step at a
//! time instead of being adopted raw.

use serde::{Deserialize, Serialize};

use crate::config::{FeedConfig, PPM_SCALE};
use crate::source::Quote;

/// Why a quote was (or was not) frozen. Order is stable for compatibility;
/// the reasons are mutually exclusive per classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeReason {
    NoResponse,
    IncorrectDecimals,
    NoRoundId,
    InvalidTimestamp,
    NonPositiveAnswer,
    AnswerIsOutlier,
    NotFreezed,
}

/// Per-pipeline acceptance state. `last_sampled_*` track the outlier
/// baseline, which refreshes on its own cadence and is deliberately
/// decoupled from the last accepted price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeState {
    pub last_valid_price: u128,
    pub last_valid_timestamp: u64,
    pub last_sampled_price: u128,
    pub last_sampled_timestamp: u64,
}

impl FreezeState {
    /// Last accepted observation, if anything was ever accepted.
    pub fn last_accepted(&self) -> Option<(u128, u64)> {
        (self.last_valid_timestamp != 0).then_some((self.last_valid_price, self.last_valid_timestamp))
    }
}

/// Outcome of one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub reason: FreezeReason,
    /// Newly adopted `(price, timestamp)`, when one was adopted.
    pub accepted: Option<(u128, u64)>,
}

impl Classification {
    fn frozen(reason: FreezeReason) -> Self {
        Self { reason, accepted: None }
    }
}

/// Stateless classifier; all mutable state lives in `FreezeState`.
#[derive(Debug, Clone)]
pub struct OutlierGuard {
    quote_decimals: u32,
    max_deviation_ppm: u64,
    cooldown_secs: u64,
    min_sampling_secs: u64,
}

impl OutlierGuard {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            quote_decimals: config.quote_decimals,
            max_deviation_ppm: config.max_deviation_ppm,
            cooldown_secs: config.cooldown_secs,
            min_sampling_secs: config.min_sampling_secs,
        }
    }

    /// Classify one quote and apply its side effects to `state`.
    ///
    /// A quote whose timestamp equals the accepted one is nothing new to
    /// process: an idempotent no-op before any freeze check, so repeated
    /// polling never produces a duplicate accumulator record.
    pub fn classify(&self, quote: &Quote, state: &mut FreezeState, now: u64) -> Classification {
        if state.last_valid_timestamp != 0 && quote.updated_at == state.last_valid_timestamp {
            return Classification::frozen(FreezeReason::NotFreezed);
        }
        if !quote.success {
            return Classification::frozen(FreezeReason::NoResponse);
        }
        if quote.decimals != self.quote_decimals {
            return Classification::frozen(FreezeReason::IncorrectDecimals);
        }
        if quote.round_id == 0 {
            return Classification::frozen(FreezeReason::NoRoundId);
        }
        if quote.updated_at == 0
            || quote.updated_at < state.last_valid_timestamp
            || quote.updated_at > now
        {
            return Classification::frozen(FreezeReason::InvalidTimestamp);
        }
        if quote.price <= 0 {
            return Classification::frozen(FreezeReason::NonPositiveAnswer);
        }

        let price = quote.price as u128;
        if state.last_valid_timestamp != 0 && self.is_outlier(price, state.last_sampled_price) {
            if now.saturating_sub(state.last_valid_timestamp) > self.cooldown_secs {
                // One bounded step toward the reading, stamped at `now`;
                // the baseline follows the corrected value.
                let corrected = self.ratchet(state.last_valid_price, price);
                state.last_valid_price = corrected;
                state.last_valid_timestamp = now;
                state.last_sampled_price = corrected;
                state.last_sampled_timestamp = now;
                return Classification {
                    reason: FreezeReason::AnswerIsOutlier,
                    accepted: Some((corrected, now)),
                };
            }
            return Classification::frozen(FreezeReason::AnswerIsOutlier);
        }

        state.last_valid_price = price;
        state.last_valid_timestamp = quote.updated_at;
        // A never-sampled baseline is seeded unconditionally; afterwards it
        // refreshes on its own cadence.
        if state.last_sampled_timestamp == 0
            || now.saturating_sub(state.last_sampled_timestamp) >= self.min_sampling_secs
        {
            state.last_sampled_price = price;
            state.last_sampled_timestamp = now;
        }
        Classification {
            reason: FreezeReason::NotFreezed,
            accepted: Some((price, quote.updated_at)),
        }
    }

    /// Relative deviation against the sampled baseline, in ppm.
    fn is_outlier(&self, price: u128, baseline: u128) -> bool {
        if baseline == 0 {
            return false;
        }
        let diff = price.abs_diff(baseline);
        let deviation_ppm = diff.saturating_mul(PPM_SCALE as u128) / baseline;
        deviation_ppm > self.max_deviation_ppm as u128
    }

    /// Move the accepted price by exactly the configured max deviation
    /// toward the incoming reading.
    fn ratchet(&self, accepted: u128, incoming: u128) -> u128 {
        let step = accepted.saturating_mul(self.max_deviation_ppm as u128) / PPM_SCALE as u128;
        if incoming > accepted {
            accepted.saturating_add(step)
        } else {
            accepted.saturating_sub(step)
        }
    }
}
