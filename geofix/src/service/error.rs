//! Service error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::publisher::PublisherError;
use crate::source::MultiplexerError;

/// Errors raised by [`FixService`](super::FixService) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The service must be started inside a Tokio runtime.
    #[error("Runtime error: no Tokio runtime available")]
    NoRuntime,

    /// The service was shut down.
    #[error("Service is shut down")]
    ShutDown,

    /// Source registration failure.
    #[error("Source error: {0}")]
    Source(#[from] MultiplexerError),

    /// Subscriber registration failure.
    #[error("Subscriber error: {0}")]
    Publisher(#[from] PublisherError),
}
