//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use geofix::config::ConfigFileError;
use geofix::service::ServiceError;
use geofix::source::SourceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Failed to load or write the configuration file
    ConfigFile(ConfigFileError),
    /// Invalid command-line value
    InvalidArgument(String),
    /// Failed to start the Tokio runtime
    Runtime(std::io::Error),
    /// Fix service error
    Service(ServiceError),
    /// Failed to read a replay file
    Replay { path: PathBuf, error: SourceError },
    /// Failed to listen for Ctrl+C
    Signal(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::ConfigFile(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in your configuration file, or recreate it with:");
                eprintln!("  geofix config init --force");
            }
            CliError::Replay {
                error: SourceError::Replay { .. },
                ..
            } => {
                eprintln!();
                eprintln!("Replay lines must look like:");
                eprintln!("  timestamp_ms,source,latitude,longitude,accuracy_m");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Service(e) => write!(f, "Fix service error: {}", e),
            CliError::Replay { path, error } => {
                write!(f, "Failed to read replay file '{}': {}", path.display(), error)
            }
            CliError::Signal(e) => write!(f, "Failed to set signal handler: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Replay { error, .. } => Some(error),
            CliError::Signal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}
