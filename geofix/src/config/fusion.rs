//! Runtime configuration of the fusion pipeline.

use thiserror::Error;

use super::defaults::*;
use crate::engine::{EngineConfig, ScoreWeights, Scorer, SourcePriority};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::validator::ValidatorConfig;

/// Invalid runtime configuration. Fatal at service construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A value that must be strictly positive was not.
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: String },

    /// A value that must not be negative was.
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: String },

    /// NaN or infinite value.
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: String },
}

/// Configuration of the whole fusion pipeline.
///
/// # Example
///
/// ```
/// use geofix::config::FusionConfig;
/// use geofix::sample::SourceId;
///
/// let config = FusionConfig::default()
///     .with_max_accuracy_m(50.0)
///     .with_queue_capacity(16);
///
/// assert_eq!(config.queue_capacity, 16);
/// assert_eq!(config.source_priority.get(SourceId::Fused), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Samples coarser than this are rejected and never become best.
    pub max_accuracy_m: f64,
    /// Time without an accepted replacement before the best fix is stale.
    pub stale_timeout_ms: i64,
    /// Minimum score improvement needed to replace the best fix.
    pub hysteresis_margin: f64,
    pub source_priority: SourcePriority,
    pub queue_capacity: usize,
    pub duplicate_window_ms: i64,
    pub timestamp_grace_ms: i64,
    pub weights: ScoreWeights,
    pub recency_half_life_ms: i64,
    pub trail_capacity: usize,
    pub subscriber_buffer: usize,
    pub stale_check_interval_ms: u64,
    pub drain_on_shutdown: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            stale_timeout_ms: DEFAULT_STALE_TIMEOUT_MS,
            hysteresis_margin: DEFAULT_HYSTERESIS_MARGIN,
            source_priority: SourcePriority::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
            timestamp_grace_ms: DEFAULT_TIMESTAMP_GRACE_MS,
            weights: ScoreWeights::default(),
            recency_half_life_ms: DEFAULT_RECENCY_HALF_LIFE_MS,
            trail_capacity: DEFAULT_TRAIL_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            stale_check_interval_ms: DEFAULT_STALE_CHECK_INTERVAL_MS,
            drain_on_shutdown: DEFAULT_DRAIN_ON_SHUTDOWN,
        }
    }
}

impl FusionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_accuracy_m(mut self, max_accuracy_m: f64) -> Self {
        self.max_accuracy_m = max_accuracy_m;
        self
    }

    pub fn with_stale_timeout_ms(mut self, stale_timeout_ms: i64) -> Self {
        self.stale_timeout_ms = stale_timeout_ms;
        self
    }

    pub fn with_hysteresis_margin(mut self, margin: f64) -> Self {
        self.hysteresis_margin = margin;
        self
    }

    pub fn with_source_priority(mut self, priority: SourcePriority) -> Self {
        self.source_priority = priority;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_duplicate_window_ms(mut self, window_ms: i64) -> Self {
        self.duplicate_window_ms = window_ms;
        self
    }

    pub fn with_timestamp_grace_ms(mut self, grace_ms: i64) -> Self {
        self.timestamp_grace_ms = grace_ms;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_trail_capacity(mut self, capacity: usize) -> Self {
        self.trail_capacity = capacity;
        self
    }

    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    pub fn with_stale_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.stale_check_interval_ms = interval_ms;
        self
    }

    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Check every value, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_f64("max_accuracy_m", self.max_accuracy_m)?;
        positive_i64("stale_timeout_ms", self.stale_timeout_ms)?;
        non_negative_f64("hysteresis_margin", self.hysteresis_margin)?;
        positive_i64("queue_capacity", self.queue_capacity as i64)?;
        non_negative_i64("duplicate_window_ms", self.duplicate_window_ms)?;
        non_negative_i64("timestamp_grace_ms", self.timestamp_grace_ms)?;
        non_negative_f64("weights.accuracy", self.weights.accuracy)?;
        non_negative_f64("weights.recency", self.weights.recency)?;
        non_negative_f64("weights.source", self.weights.source)?;
        positive_i64("recency_half_life_ms", self.recency_half_life_ms)?;
        positive_i64("subscriber_buffer", self.subscriber_buffer as i64)?;
        positive_i64("stale_check_interval_ms", self.stale_check_interval_ms as i64)?;
        Ok(())
    }

    /// Validator configuration derived from this config.
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_accuracy_m: self.max_accuracy_m,
            timestamp_grace_ms: self.timestamp_grace_ms,
            duplicate_window_ms: self.duplicate_window_ms,
        }
    }

    /// Engine configuration derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_accuracy_m: self.max_accuracy_m,
            stale_timeout_ms: self.stale_timeout_ms,
            hysteresis_margin: self.hysteresis_margin,
            trail_capacity: self.trail_capacity,
        }
    }

    /// Scorer built from weights, priorities and half life.
    pub fn scorer(&self) -> Scorer {
        Scorer::new(
            self.weights,
            self.source_priority.clone(),
            self.recency_half_life_ms,
        )
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite {
            field,
            value: value.to_string(),
        })
    }
}

fn positive_f64(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive {
            field,
            value: value.to_string(),
        })
    }
}

fn non_negative_f64(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative {
            field,
            value: value.to_string(),
        })
    }
}

fn positive_i64(field: &'static str, value: i64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive {
            field,
            value: value.to_string(),
        })
    }
}

fn non_negative_i64(field: &'static str, value: i64) -> Result<(), ConfigError> {
    if value >= 0 {
        Ok(())
    } else {
        Err(ConfigError::Negative {
            field,
            value: value.to_string(),
        })
    }
}
