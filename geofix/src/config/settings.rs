//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;

use crate::engine::{ScoreWeights, SourcePriority};
use crate::sample::SourceId;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Staleness engine settings
    pub engine: EngineSettings,
    /// Score term weights
    pub weights: ScoreWeights,
    /// Per-source priority
    pub priority: SourcePriority,
    /// Ingestion queue settings
    pub queue: QueueSettings,
    /// Validator settings
    pub validator: ValidatorSettings,
    /// Consumer and publisher settings
    pub service: ServiceSettings,
    /// ForeFlight UDP source settings
    pub foreflight: ForeFlightSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Staleness engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub max_accuracy_m: f64,
    pub stale_timeout_ms: i64,
    pub hysteresis_margin: f64,
    pub recency_half_life_ms: i64,
    /// 0 disables motion derivation.
    pub trail_capacity: usize,
}

/// Ingestion queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub capacity: usize,
}

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSettings {
    pub timestamp_grace_ms: i64,
    pub duplicate_window_ms: i64,
}

/// Fix service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Bounded hand-off buffer per subscriber
    pub subscriber_buffer: usize,
    /// Staleness ticker interval
    pub stale_check_interval_ms: u64,
    /// Process (true) or discard (false) queued samples on shutdown
    pub drain_on_shutdown: bool,
}

/// ForeFlight UDP source configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeFlightSettings {
    /// Start the receiver with `geofix run`
    pub enabled: bool,
    pub port: u16,
    /// Accuracy radius assigned to received positions
    pub accuracy_m: f64,
    /// Source the receiver registers as
    pub source: SourceId,
    pub min_update_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
    /// Force debug level
    pub debug: bool,
    /// Mirror log output to stdout
    pub stdout: bool,
}
