//! Pool Configuration Module
//!
//! Provides configuration loading and validation for Tidal pools.
//! Supports loading from TOML files with environment-specific overrides.

use crate::protocol::{MAX_SPLITS, MIN_SPLITS};
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Rejected pool parameters
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("splits {splits} outside supported range [{min}, {max}]")]
    SplitsOutOfRange { splits: u8, min: u8, max: u8 },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: Decimal },

    #[error("{field} must lie in [0, 1), got {value}")]
    NotAFraction { field: &'static str, value: Decimal },

    #[error("token{token} decimals {decimals} exceed the supported maximum of 24")]
    DecimalsTooLarge { token: usize, decimals: u8 },
}

/// Top-level engine configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    /// Pool parameters
    #[serde(default)]
    pub pool: PoolSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Per-pool tunables
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    /// Display symbols of the pair, token0 first
    pub symbols: [String; 2],

    /// Decimal scale of each asset's external integer amounts
    pub decimals: [u8; 2],

    /// Bin granularity exponent, `BINS = 2^splits`
    pub splits: u8,

    /// Initial price (token1 per token0)
    pub initial_price: Decimal,

    /// Liquidity-to-token scale factor
    pub epsilon: Decimal,

    /// Spot fee charged on swap input (0.0005 = 5 bps)
    pub spot_fee: Decimal,

    /// Per-day spread applied to fixed-token backing while a TWAP is active
    pub twap_spread: Decimal,

    /// Highest utilization an origination may push a bin to
    pub utilization_cap: Decimal,

    /// Floor of the origination rate
    pub min_rate: Decimal,

    /// Starting daily log-price variance
    pub initial_variance: Decimal,

    /// Variance the rolling tracker relaxes toward
    pub variance_floor: Decimal,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            symbols: ["TOKEN0".to_string(), "TOKEN1".to_string()],
            decimals: [18, 18],
            splits: 12,
            initial_price: dec!(1),
            epsilon: dec!(1),
            spot_fee: dec!(0.0005),
            twap_spread: dec!(0.001),
            utilization_cap: dec!(0.9),
            min_rate: dec!(0.0001),
            initial_variance: dec!(0.0004),
            variance_floor: dec!(0.0001),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
        }
    }
}

impl PoolSettings {
    /// Reject parameters the engine cannot operate with
    pub fn validate(&self) -> std::result::Result<(), SettingsError> {
        if !(MIN_SPLITS..=MAX_SPLITS).contains(&self.splits) {
            return Err(SettingsError::SplitsOutOfRange {
                splits: self.splits,
                min: MIN_SPLITS,
                max: MAX_SPLITS,
            });
        }
        for (field, value) in [
            ("initial_price", self.initial_price),
            ("epsilon", self.epsilon),
            ("min_rate", self.min_rate),
            ("variance_floor", self.variance_floor),
            ("initial_variance", self.initial_variance),
        ] {
            if value <= Decimal::ZERO {
                return Err(SettingsError::NotPositive { field, value });
            }
        }
        for (field, value) in [
            ("spot_fee", self.spot_fee),
            ("twap_spread", self.twap_spread),
            ("utilization_cap", self.utilization_cap),
        ] {
            if value < Decimal::ZERO || value >= Decimal::ONE {
                return Err(SettingsError::NotAFraction { field, value });
            }
        }
        for (token, decimals) in self.decimals.iter().enumerate() {
            if *decimals > 24 {
                return Err(SettingsError::DecimalsTooLarge {
                    token,
                    decimals: *decimals,
                });
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/tidal.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("config"))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (TIDAL_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("TIDAL")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .pool
            .validate()
            .context("Invalid pool settings")?;

        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    /// Expand environment variables in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(dir) = &self.logging.log_dir {
            let expanded = shellexpand::env(&dir.to_string_lossy())
                .context("Failed to expand log directory")?
                .to_string();
            self.logging.log_dir = Some(PathBuf::from(expanded));
        }
        Ok(())
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>, environment: Option<&str>) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(path, environment)?;
    config.expand_env_vars()?;
    Ok(config)
}
