//! Configuration for GeoFix.
//!
//! Two layers:
//!
//! - [`FusionConfig`]: the validated runtime configuration consumed by the
//!   fix service, with builder-style overrides.
//! - [`ConfigFile`]: the user's `~/.geofix/config.ini`, loaded with defaults
//!   when absent and converted into a [`FusionConfig`].
//!
//! # Example
//!
//! ```
//! use geofix::config::FusionConfig;
//!
//! let config = FusionConfig::default()
//!     .with_stale_timeout_ms(5_000)
//!     .with_hysteresis_margin(0.02);
//! assert!(config.validate().is_ok());
//! ```

mod defaults;
mod file;
mod fusion;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use fusion::{ConfigError, FusionConfig};
pub use settings::*;
