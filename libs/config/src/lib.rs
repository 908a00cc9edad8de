//! # Tidal Configuration
//!
//! Protocol constants and pool configuration for the Tidal engine and the
//! services built on it.
//!
//! ## Features
//!
//! - **Protocol Constants**: tub/bin discretization, clock resolution, rebase threshold
//! - **Pool Settings**: fee, spread, utilization and variance parameters
//! - **Loading**: TOML files with environment-specific overrides
//!
//! ## Usage
//!
//! ```rust
//! use tidal_config::{protocol, PoolSettings};
//!
//! let settings = PoolSettings::default();
//! assert!(settings.validate().is_ok());
//! assert_eq!(protocol::TUBS, 4096);
//! ```

pub mod pool_config;
pub mod protocol;

// Re-export commonly used types
pub use pool_config::{load_config, EngineConfig, LoggingSettings, PoolSettings, SettingsError};
pub use protocol::*;
