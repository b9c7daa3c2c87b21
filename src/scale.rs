//! Fixed-point decimal rescaling
//!
//! Converts a `(value, decimals)` pair to another decimal precision.
//! Downscaling truncates; callers must tolerate the precision loss.

use crate::config::MAX_DECIMALS;
use crate::error::{OracleError, Result};

/// Rescale `value` from `from_decimals` to `to_decimals` of precision.
pub fn rescale(value: u128, from_decimals: u32, to_decimals: u32) -> Result<u128> {
    if from_decimals > MAX_DECIMALS || to_decimals > MAX_DECIMALS {
        return Err(OracleError::Config(format!(
            "decimal precision must be <= {}, got {}/{}",
            MAX_DECIMALS, from_decimals, to_decimals
        )));
    }
    if from_decimals == to_decimals {
        Ok(value)
    } else if from_decimals > to_decimals {
        // Truncating integer division.
        Ok(value / pow10(from_decimals - to_decimals)?)
    } else {
        value
            .checked_mul(pow10(to_decimals - from_decimals)?)
            .ok_or(OracleError::Overflow("rescale"))
    }
}

fn pow10(exp: u32) -> Result<u128> {
    10u128.checked_pow(exp).ok_or(OracleError::Overflow("pow10"))
}
