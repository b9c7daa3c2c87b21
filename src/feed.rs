//! Price feed pipeline
//!
//! Wires one quote source through the full path:
//! fetch -> classify -> record -> twap -> rescale.
//!
//! Each public entry point is transactional: it either fully applies its
//! state mutation or fails with none applied. Time is always an explicit
//! caller input; the feed never reads a wall clock, which keeps the whole
//! pipeline deterministic and testable.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::Result;
use crate::guard::{FreezeReason, FreezeState, OutlierGuard};
use crate::scale;
use crate::source::QuoteSource;
use crate::twap::TwapAccumulator;

struct FeedState {
    freeze: FreezeState,
    accumulator: TwapAccumulator,
    last_reason: FreezeReason,
}

/// One price pipeline: a quote source plus its guard and TWAP cache.
///
/// Reads (`read_cached_twap`, `is_stale`, `current_freeze_reason`) take a
/// shared lock and may run concurrently; mutations take the write lock.
pub struct PriceFeed {
    source: Arc<dyn QuoteSource>,
    guard: OutlierGuard,
    config: FeedConfig,
    state: RwLock<FeedState>,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn QuoteSource>, config: FeedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            guard: OutlierGuard::new(&config),
            config,
            source,
            state: RwLock::new(FeedState {
                freeze: FreezeState::default(),
                accumulator: TwapAccumulator::new(),
                last_reason: FreezeReason::NotFreezed,
            }),
        })
    }

    /// Source name for logs.
    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Fetch, classify, accumulate and return the canonical-decimals TWAP
    /// over `interval` seconds (the spot price when `interval == 0`).
    pub fn record_and_cache(&self, interval: u64, now: u64) -> Result<u128> {
        let quote = self.source.fetch();
        let mut state = self.state.write();

        let outcome = self.guard.classify(&quote, &mut state.freeze, now);

        match (outcome.reason, outcome.accepted) {
            (FreezeReason::NotFreezed, Some((price, timestamp))) => {
                debug!(source = self.name(), price, timestamp, "quote accepted");
                state.accumulator.record(price, timestamp)?;
                state.last_reason = FreezeReason::NotFreezed;
            }
            (FreezeReason::AnswerIsOutlier, Some((price, timestamp))) => {
                info!(
                    source = self.name(),
                    corrected = price,
                    raw = quote.price,
                    "outlier absorbed with one correction step"
                );
                state.accumulator.record(price, timestamp)?;
                state.last_reason = FreezeReason::AnswerIsOutlier;
            }
            (FreezeReason::NotFreezed, None) => {
                // Nothing new to process; the previously reported reason
                // stays visible rather than being masked by the no-op.
                debug!(source = self.name(), "no new round, nothing to record");
            }
            (reason, _) => {
                warn!(source = self.name(), ?reason, "quote rejected");
                state.last_reason = reason;
            }
        }

        self.project(&state, interval, now)
    }

    /// `record_and_cache` over the configured default window.
    pub fn record_and_cache_default(&self, now: u64) -> Result<u128> {
        self.record_and_cache(self.config.default_interval_secs, now)
    }

    /// Pure projection of the current cache: no fetch, no mutation.
    /// Computable even while the upstream is failing, from the last
    /// accepted state alone.
    pub fn read_cached_twap(&self, interval: u64, now: u64) -> Result<u128> {
        let state = self.state.read();
        self.project(&state, interval, now)
    }

    /// True iff the time since the last accepted observation exceeds the
    /// configured timeout. A feed that never accepted anything is stale.
    pub fn is_stale(&self, now: u64) -> bool {
        let state = self.state.read();
        now.saturating_sub(state.freeze.last_valid_timestamp) > self.config.timeout_secs
    }

    /// Outcome of the most recent classification.
    pub fn current_freeze_reason(&self) -> FreezeReason {
        self.state.read().last_reason
    }

    /// Last accepted `(price, timestamp)`, if anything was ever accepted.
    pub fn last_accepted(&self) -> Option<(u128, u64)> {
        self.state.read().freeze.last_accepted()
    }

    fn project(&self, state: &FeedState, interval: u64, now: u64) -> Result<u128> {
        let spot = state.freeze.last_valid_price;
        let twap = state.accumulator.twap(interval, spot, now)?;
        scale::rescale(twap, self.config.quote_decimals, self.config.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Quote, ScriptedSource};

    fn config() -> FeedConfig {
        FeedConfig {
            decimals: 8, // canonical == quote so surfaced values read raw
            quote_decimals: 8,
            timeout_secs: 120,
            max_deviation_ppm: 100_000,
            cooldown_secs: 600,
            default_interval_secs: 60,
            min_sampling_secs: 300,
        }
    }

    fn ok_quote(price: i128, updated_at: u64) -> Quote {
        Quote {
            price,
            decimals: 8,
            updated_at,
            round_id: 1,
            success: true,
        }
    }

    fn feed_with(quotes: Vec<Quote>) -> PriceFeed {
        let source = Arc::new(ScriptedSource::new("scripted", quotes));
        PriceFeed::new(source, config()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let source = Arc::new(ScriptedSource::new("scripted", []));
        let bad = FeedConfig {
            max_deviation_ppm: 2_000_000,
            ..config()
        };
        assert!(PriceFeed::new(source, bad).is_err());
    }

    #[test]
    fn test_spot_price_when_interval_zero() {
        let feed = feed_with(vec![ok_quote(50_000, 1_000)]);
        assert_eq!(feed.record_and_cache(0, 1_000).unwrap(), 50_000);
        assert_eq!(feed.current_freeze_reason(), FreezeReason::NotFreezed);
    }

    #[test]
    fn test_twap_over_two_rounds() {
        let feed = feed_with(vec![ok_quote(1_000_000, 1_000), ok_quote(1_001_000, 1_001)]);
        feed.record_and_cache(0, 1_000).unwrap();
        assert_eq!(feed.record_and_cache(2, 1_002).unwrap(), 1_000_500);
    }

    #[test]
    fn test_rescales_to_canonical_decimals() {
        let source = Arc::new(ScriptedSource::new("scripted", [ok_quote(50_000, 1_000)]));
        let feed = PriceFeed::new(
            source,
            FeedConfig {
                decimals: 10,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(feed.record_and_cache(0, 1_000).unwrap(), 5_000_000);
    }

    #[test]
    fn test_repeated_poll_never_records_duplicate() {
        let feed = feed_with(vec![ok_quote(50_000, 1_000)]);
        feed.record_and_cache(0, 1_000).unwrap();
        // The script now repeats the same round; both polls are no-ops.
        feed.record_and_cache(0, 1_010).unwrap();
        let price = feed.record_and_cache(0, 1_020).unwrap();
        assert_eq!(price, 50_000);
        assert_eq!(feed.current_freeze_reason(), FreezeReason::NotFreezed);
        assert_eq!(feed.last_accepted(), Some((50_000, 1_000)));
    }

    #[test]
    fn test_no_op_poll_preserves_freeze_reason() {
        let feed = feed_with(vec![
            ok_quote(300, 1_000),
            ok_quote(500, 1_100),
            ok_quote(300, 1_000),
        ]);
        feed.record_and_cache(0, 1_000).unwrap();

        // Outlier held during the cooldown window.
        feed.record_and_cache(0, 1_100).unwrap();
        assert_eq!(feed.current_freeze_reason(), FreezeReason::AnswerIsOutlier);

        // Re-polling the old round is nothing new to process; the freeze
        // condition stays reported.
        feed.record_and_cache(0, 1_200).unwrap();
        assert_eq!(feed.current_freeze_reason(), FreezeReason::AnswerIsOutlier);
        assert_eq!(feed.last_accepted(), Some((300, 1_000)));
    }

    #[test]
    fn test_cached_twap_survives_upstream_failure() {
        let feed = feed_with(vec![ok_quote(50_000, 1_000), Quote::failed()]);
        feed.record_and_cache(0, 1_000).unwrap();

        // Upstream starts failing: recording reports NoResponse but the
        // cached projection still serves the last accepted price.
        let price = feed.record_and_cache(60, 1_030).unwrap();
        assert_eq!(price, 50_000);
        assert_eq!(feed.current_freeze_reason(), FreezeReason::NoResponse);
        assert_eq!(feed.read_cached_twap(60, 1_050).unwrap(), 50_000);
    }

    #[test]
    fn test_read_cached_twap_does_not_mutate() {
        let feed = feed_with(vec![ok_quote(50_000, 1_000)]);
        feed.record_and_cache(0, 1_000).unwrap();
        let before = feed.last_accepted();
        feed.read_cached_twap(60, 1_100).unwrap();
        feed.read_cached_twap(0, 1_200).unwrap();
        assert_eq!(feed.last_accepted(), before);
    }

    #[test]
    fn test_staleness() {
        let feed = feed_with(vec![ok_quote(50_000, 1_000)]);
        // Nothing accepted yet: stale.
        assert!(feed.is_stale(1_000));

        feed.record_and_cache(0, 1_000).unwrap();
        assert!(!feed.is_stale(1_120)); // exactly at the timeout boundary
        assert!(feed.is_stale(1_121));
    }

    #[test]
    fn test_outlier_correction_lands_in_cache() {
        let feed = feed_with(vec![ok_quote(300, 1_000), ok_quote(500, 1_700)]);
        feed.record_and_cache(0, 1_000).unwrap();

        // Cooldown elapsed: the 500 reading is absorbed as one 10% step.
        let price = feed.record_and_cache(0, 1_700).unwrap();
        assert_eq!(price, 330);
        assert_eq!(feed.current_freeze_reason(), FreezeReason::AnswerIsOutlier);
        assert_eq!(feed.last_accepted(), Some((330, 1_700)));
    }

    #[test]
    fn test_never_responding_source_reports_no_response() {
        let mut mock = crate::source::MockQuoteSource::new();
        mock.expect_name().return_const("mock".to_string());
        mock.expect_fetch().returning(Quote::failed);

        let feed = PriceFeed::new(Arc::new(mock), config()).unwrap();
        assert_eq!(feed.record_and_cache(0, 1_000).unwrap(), 0);
        assert_eq!(feed.current_freeze_reason(), FreezeReason::NoResponse);
        assert_eq!(feed.last_accepted(), None);
        assert!(feed.is_stale(1_000));
    }

    #[test]
    fn test_default_interval() {
        let feed = feed_with(vec![ok_quote(1_000_000, 1_000), ok_quote(1_001_000, 1_030)]);
        feed.record_and_cache(0, 1_000).unwrap();
        // 60s default window at t=1060: 30s at 1000.000, 30s at 1001.000.
        assert_eq!(feed.record_and_cache_default(1_060).unwrap(), 1_000_500);
    }
}
