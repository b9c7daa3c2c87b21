//! Configuration management
//!
//! All parameters are fixed at construction and validated before any feed
//! state exists. Invalid parameters are fatal (`OracleError::Config`).

use serde::Deserialize;
use std::path::Path;

use crate::error::{OracleError, Result};

/// Fixed-point scale for deviation ratios: 1_000_000 ppm = 100%.
pub const PPM_SCALE: u64 = 1_000_000;

/// Largest decimal precision the scaler supports without overflowing u128.
pub const MAX_DECIMALS: u32 = 38;

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub primary: FeedConfig,
    pub fallback: Option<FeedConfig>,
}

/// Per-pipeline configuration, immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
    /// Canonical decimal precision of surfaced prices
    pub decimals: u32,
    /// Decimal precision the upstream quote must report
    pub quote_decimals: u32,
    /// Seconds without an accepted observation before the feed is stale
    pub timeout_secs: u64,
    /// Maximum relative deviation against the sampled baseline, in ppm
    pub max_deviation_ppm: u64,
    /// Seconds an outlier must persist before one correction step is taken
    pub cooldown_secs: u64,
    /// TWAP window used when the caller does not pick one
    pub default_interval_secs: u64,
    /// Minimum seconds between refreshes of the outlier baseline
    pub min_sampling_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            decimals: 18,
            quote_decimals: 8,
            timeout_secs: 3600,         // 1 hour
            max_deviation_ppm: 100_000, // 10%
            cooldown_secs: 1800,        // 30 minutes
            default_interval_secs: 1800,
            min_sampling_secs: 300, // 5 minutes
        }
    }
}

impl FeedConfig {
    /// Reject out-of-range parameters before any state is built.
    pub fn validate(&self) -> Result<()> {
        if self.decimals > MAX_DECIMALS || self.quote_decimals > MAX_DECIMALS {
            return Err(OracleError::Config(format!(
                "decimal precision must be <= {}, got {}/{}",
                MAX_DECIMALS, self.decimals, self.quote_decimals
            )));
        }
        if self.max_deviation_ppm == 0 || self.max_deviation_ppm >= PPM_SCALE {
            return Err(OracleError::Config(format!(
                "max_deviation_ppm must be in 1..{}, got {}",
                PPM_SCALE, self.max_deviation_ppm
            )));
        }
        if self.timeout_secs == 0 {
            return Err(OracleError::Config("timeout_secs must be non-zero".into()));
        }
        Ok(())
    }
}

impl OracleConfig {
    /// Load configuration from file, with `ORACLE_*` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| OracleError::Config("configuration path is not valid UTF-8".into()))?;
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ORACLE"))
            .build()
            .map_err(|e| OracleError::Config(e.to_string()))?;

        let config: OracleConfig = settings
            .try_deserialize()
            .map_err(|e| OracleError::Config(e.to_string()))?;
        config.primary.validate()?;
        if let Some(fallback) = &config.fallback {
            fallback.validate()?;
        }
        Ok(config)
    }

    /// Load from default locations.
    pub fn load_default() -> Result<Self> {
        let paths = ["oracle.toml", "~/.config/price-oracle/oracle.toml"];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        Err(OracleError::Config("no configuration file found".into()))
    }
}
