//! Validator - sanity checks for raw position samples.
//!
//! Every sample drained from the ingestion queue passes through
//! [`Validator::validate`] before it may compete for best fix. Malformed or
//! implausible samples become [`Rejection`]s; nothing here returns an error
//! or panics, so one bad sample never interrupts ingestion.
//!
//! # Checks (in order)
//!
//! 1. Coordinates inside [-90, 90] / [-180, 180] (non-finite is out of range)
//! 2. Accuracy is a finite, non-negative radius
//! 3. Accuracy no coarser than the configured ceiling
//! 4. Not a repeat of the same source's last position within the duplicate window
//! 5. Timestamp not older than the last accepted timestamp minus the grace period

use std::collections::HashMap;

use thiserror::Error;

use crate::config::{
    DEFAULT_DUPLICATE_WINDOW_MS, DEFAULT_MAX_ACCURACY_M, DEFAULT_TIMESTAMP_GRACE_MS,
};
use crate::sample::{PositionSample, SourceId};

/// Configuration for the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Samples with a coarser accuracy radius are rejected.
    pub max_accuracy_m: f64,
    /// How far behind the last accepted timestamp a sample may be.
    pub timestamp_grace_ms: i64,
    /// Window within which a same-source, same-position sample is a duplicate.
    pub duplicate_window_ms: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            timestamp_grace_ms: DEFAULT_TIMESTAMP_GRACE_MS,
            duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
        }
    }
}

/// Why a sample was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// Latitude or longitude outside the valid range.
    #[error("coordinates out of range: lat={latitude}, lon={longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },

    /// Accuracy radius is negative or not a number.
    #[error("invalid accuracy radius: {0}")]
    InvalidAccuracy(f64),

    /// Accuracy radius above the configured ceiling.
    #[error("accuracy too coarse: {accuracy_m}m > {max_m}m")]
    AccuracyTooCoarse { accuracy_m: f64, max_m: f64 },

    /// Timestamp too far behind the last accepted sample.
    #[error("timestamp regression: {timestamp_ms}ms is more than {grace_ms}ms before {last_ms}ms")]
    TimestampRegression {
        timestamp_ms: i64,
        last_ms: i64,
        grace_ms: i64,
    },

    /// Same source reported the same coordinates within the duplicate window.
    #[error("duplicate position from {source_id} within {window_ms}ms")]
    DuplicateWithinWindow { source_id: SourceId, window_ms: i64 },
}

impl Rejection {
    /// Duplicates are expected traffic, not faults.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::DuplicateWithinWindow { .. })
    }
}

/// Outcome of validating one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The sample may compete for best fix.
    Accepted,
    /// The sample is dropped.
    Rejected(Rejection),
}

impl Verdict {
    /// True for [`Verdict::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Validation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    pub accepted: u64,
    pub out_of_range: u64,
    pub invalid_accuracy: u64,
    pub accuracy_too_coarse: u64,
    pub timestamp_regression: u64,
    pub duplicates: u64,
}

impl ValidatorStats {
    /// Total number of rejected samples, duplicates included.
    pub fn rejected(&self) -> u64 {
        self.out_of_range
            + self.invalid_accuracy
            + self.accuracy_too_coarse
            + self.timestamp_regression
            + self.duplicates
    }

    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::OutOfRange { .. } => self.out_of_range += 1,
            Rejection::InvalidAccuracy(_) => self.invalid_accuracy += 1,
            Rejection::AccuracyTooCoarse { .. } => self.accuracy_too_coarse += 1,
            Rejection::TimestampRegression { .. } => self.timestamp_regression += 1,
            Rejection::DuplicateWithinWindow { .. } => self.duplicates += 1,
        }
    }
}

/// Sample validator.
#[derive(Debug)]
pub struct Validator {
    config: ValidatorConfig,
    /// Highest timestamp among accepted samples.
    high_water_ms: Option<i64>,
    /// Last accepted sample per source, for duplicate detection.
    last_by_source: HashMap<SourceId, PositionSample>,
    stats: ValidatorStats,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl Validator {
    /// Create a validator.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            high_water_ms: None,
            last_by_source: HashMap::new(),
            stats: ValidatorStats::default(),
        }
    }

    /// Validator configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Counters since creation (not cleared by [`Validator::reset`]).
    pub fn stats(&self) -> ValidatorStats {
        self.stats
    }

    /// Validate a sample and update bookkeeping.
    pub fn validate(&mut self, sample: &PositionSample) -> Verdict {
        match self.check(sample) {
            Ok(()) => {
                self.stats.accepted += 1;
                self.high_water_ms = Some(
                    self.high_water_ms
                        .map_or(sample.timestamp_ms(), |hw| hw.max(sample.timestamp_ms())),
                );
                self.last_by_source.insert(sample.source(), *sample);
                Verdict::Accepted
            }
            Err(rejection) => {
                self.stats.record(&rejection);
                if rejection.is_silent() {
                    tracing::trace!(source = %sample.source(), "Duplicate sample dropped");
                } else {
                    tracing::debug!(
                        source = %sample.source(),
                        reason = %rejection,
                        "Sample rejected by validator"
                    );
                }
                Verdict::Rejected(rejection)
            }
        }
    }

    /// Forget timestamps and duplicate history (counters are kept).
    pub fn reset(&mut self) {
        self.high_water_ms = None;
        self.last_by_source.clear();
    }

    fn check(&self, sample: &PositionSample) -> Result<(), Rejection> {
        let (latitude, longitude) = sample.coordinates();
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Rejection::OutOfRange {
                latitude,
                longitude,
            });
        }

        let accuracy_m = sample.accuracy_m();
        if !accuracy_m.is_finite() || accuracy_m < 0.0 {
            return Err(Rejection::InvalidAccuracy(accuracy_m));
        }
        if accuracy_m > self.config.max_accuracy_m {
            return Err(Rejection::AccuracyTooCoarse {
                accuracy_m,
                max_m: self.config.max_accuracy_m,
            });
        }

        if let Some(previous) = self.last_by_source.get(&sample.source()) {
            let gap = sample.timestamp_ms().abs_diff(previous.timestamp_ms());
            let window = self.config.duplicate_window_ms.unsigned_abs();
            if previous.same_position(sample) && gap <= window {
                return Err(Rejection::DuplicateWithinWindow {
                    source_id: sample.source(),
                    window_ms: self.config.duplicate_window_ms,
                });
            }
        }

        if let Some(last_ms) = self.high_water_ms {
            if sample.timestamp_ms() < last_ms.saturating_sub(self.config.timestamp_grace_ms) {
                return Err(Rejection::TimestampRegression {
                    timestamp_ms: sample.timestamp_ms(),
                    last_ms,
                    grace_ms: self.config.timestamp_grace_ms,
                });
            }
        }

        Ok(())
    }
}
