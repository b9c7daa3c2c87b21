//! Error types for the oracle core
//!
//! Only genuinely fatal conditions are errors: invalid configuration,
//! conflicting timestamps and arithmetic overflow. Upstream failures and
//! outlier readings are modeled as data (`FreezeReason`) because callers
//! routinely branch on them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate timestamp: last recorded {last}, got {got}")]
    DuplicateTimestamp { last: u64, got: u64 },

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

pub type Result<T> = std::result::Result<T, OracleError>;
