//! Price oracle aggregation core
//!
//! Ingests raw quotes from external price sources, filters outlier
//! readings, maintains a time-weighted average price cache and fails over
//! to a fallback source once the primary goes stale.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod guard;
pub mod scale;
pub mod source;
pub mod twap;

pub use config::{FeedConfig, OracleConfig, PPM_SCALE};
pub use dispatch::{DispatchState, SourceDispatcher};
pub use error::{OracleError, Result};
pub use feed::PriceFeed;
pub use guard::{Classification, FreezeReason, FreezeState, OutlierGuard};
pub use source::{Quote, QuoteSource, ScriptedSource};
pub use twap::{Observation, TwapAccumulator};
