//! Default values for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use super::file::config_directory;
use super::settings::*;
use crate::engine::{ScoreWeights, SourcePriority};
use crate::sample::SourceId;

// =============================================================================
// Engine
// =============================================================================

/// Samples with a coarser accuracy radius are rejected.
pub const DEFAULT_MAX_ACCURACY_M: f64 = 200.0;

/// Time without an accepted replacement before the best fix is stale.
pub const DEFAULT_STALE_TIMEOUT_MS: i64 = 10_000;

/// Minimum score improvement needed to replace the best fix.
pub const DEFAULT_HYSTERESIS_MARGIN: f64 = 0.01;

/// Age at which the recency term of the score halves.
pub const DEFAULT_RECENCY_HALF_LIFE_MS: i64 = 5_000;

/// Accepted fixes kept for motion derivation.
pub const DEFAULT_TRAIL_CAPACITY: usize = 8;

// =============================================================================
// Score weights
// =============================================================================

pub const DEFAULT_WEIGHT_ACCURACY: f64 = 1.0;
pub const DEFAULT_WEIGHT_RECENCY: f64 = 0.05;
pub const DEFAULT_WEIGHT_SOURCE: f64 = 0.01;

// =============================================================================
// Validator
// =============================================================================

/// How far a timestamp may regress behind the last accepted sample.
pub const DEFAULT_TIMESTAMP_GRACE_MS: i64 = 2_000;

/// Identical positions from one source within this window are duplicates.
pub const DEFAULT_DUPLICATE_WINDOW_MS: i64 = 500;

// =============================================================================
// Service
// =============================================================================

/// Per-subscriber hand-off buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 32;

/// Interval of the staleness ticker.
pub const DEFAULT_STALE_CHECK_INTERVAL_MS: u64 = 250;

/// Whether queued samples are processed on shutdown.
pub const DEFAULT_DRAIN_ON_SHUTDOWN: bool = true;

// =============================================================================
// ForeFlight source
// =============================================================================

/// Standard ForeFlight broadcast port.
pub const DEFAULT_FOREFLIGHT_PORT: u16 = 49002;

/// Accuracy radius assigned to ForeFlight positions.
pub const DEFAULT_FOREFLIGHT_ACCURACY_M: f64 = 10.0;

/// Minimum interval between emitted ForeFlight samples.
pub const DEFAULT_FOREFLIGHT_MIN_UPDATE_INTERVAL_MS: u64 = 2_000;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_FILE_NAME: &str = "geofix.log";

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = config_directory();

        Self {
            engine: EngineSettings {
                max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
                stale_timeout_ms: DEFAULT_STALE_TIMEOUT_MS,
                hysteresis_margin: DEFAULT_HYSTERESIS_MARGIN,
                recency_half_life_ms: DEFAULT_RECENCY_HALF_LIFE_MS,
                trail_capacity: DEFAULT_TRAIL_CAPACITY,
            },
            weights: ScoreWeights::default(),
            priority: SourcePriority::default(),
            queue: QueueSettings {
                capacity: crate::queue::DEFAULT_QUEUE_CAPACITY,
            },
            validator: ValidatorSettings {
                timestamp_grace_ms: DEFAULT_TIMESTAMP_GRACE_MS,
                duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
            },
            service: ServiceSettings {
                subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
                stale_check_interval_ms: DEFAULT_STALE_CHECK_INTERVAL_MS,
                drain_on_shutdown: DEFAULT_DRAIN_ON_SHUTDOWN,
            },
            foreflight: ForeFlightSettings {
                enabled: false,
                port: DEFAULT_FOREFLIGHT_PORT,
                accuracy_m: DEFAULT_FOREFLIGHT_ACCURACY_M,
                source: SourceId::Gps,
                min_update_interval_ms: DEFAULT_FOREFLIGHT_MIN_UPDATE_INTERVAL_MS,
            },
            logging: LoggingSettings {
                file: config_dir.join(DEFAULT_LOG_FILE_NAME),
                debug: false,
                stdout: true,
            },
        }
    }
}
