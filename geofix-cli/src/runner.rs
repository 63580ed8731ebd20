//! CLI runner for common setup.
//!
//! Encapsulates configuration loading, logging initialization and runtime
//! creation so command handlers don't repeat it.

use tokio::runtime::Runtime;
use tracing::info;

use geofix::config::{ConfigFile, FusionConfig};
use geofix::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Load config and initialize logging.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let logging_guard = init_logging(
            &config.logging.file,
            config.logging.stdout,
            debug_mode || config.logging.debug,
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Pipeline configuration from the loaded file.
    pub fn fusion_config(&self) -> FusionConfig {
        self.config.fusion_config()
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("GeoFix v{}", geofix::VERSION);
        info!("GeoFix CLI: {} command", command);
        info!(log_file = %self.config.logging.file.display(), "Logging to file");
    }

    /// Build the multi-threaded Tokio runtime.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("geofix")
            .build()
            .map_err(CliError::Runtime)
    }
}
