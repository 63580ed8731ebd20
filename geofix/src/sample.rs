//! Core sample types for position fusion.
//!
//! - [`SourceId`] - Which provider produced a sample
//! - [`RawPosition`] - Untagged position as produced by a source adapter
//! - [`PositionSample`] - Immutable, source-tagged sample consumed by the validator

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Identifies the provider that produced a position sample.
///
/// The ordering of variants carries no meaning; relative preference between
/// sources is configured through [`crate::engine::SourcePriority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// Satellite receiver (GNSS).
    Gps,
    /// Cell / Wi-Fi network positioning.
    Network,
    /// Platform-fused provider output.
    Fused,
    /// Positions piggy-backed from other applications' requests.
    Passive,
    /// User-provided reference point or last-known-location seed.
    Manual,
}

impl SourceId {
    /// All known sources, in display order.
    pub const ALL: [SourceId; 5] = [
        SourceId::Fused,
        SourceId::Gps,
        SourceId::Network,
        SourceId::Passive,
        SourceId::Manual,
    ];

    /// Lowercase name used in config files, replay files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Network => "network",
            Self::Fused => "fused",
            Self::Passive => "passive",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown position source '{0}' (expected one of: fused, gps, network, passive, manual)")]
pub struct ParseSourceIdError(pub String);

impl FromStr for SourceId {
    type Err = ParseSourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gps" => Ok(Self::Gps),
            "network" => Ok(Self::Network),
            "fused" => Ok(Self::Fused),
            "passive" => Ok(Self::Passive),
            "manual" => Ok(Self::Manual),
            other => Err(ParseSourceIdError(other.to_string())),
        }
    }
}

/// Position reported by a source adapter before it is tagged with a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    /// Horizontal accuracy radius in meters (lower is better).
    pub accuracy_m: f64,
    /// Measurement time in milliseconds on the source clock.
    pub timestamp_ms: i64,
}

impl RawPosition {
    /// Create a raw position.
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp_ms,
        }
    }
}

/// A single raw position sample, tagged with its source.
///
/// Samples are immutable once created. Construction never fails: sanity
/// checks belong to the [`crate::validator::Validator`], which turns malformed
/// samples into rejection outcomes instead of errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    latitude: f64,
    longitude: f64,
    accuracy_m: f64,
    timestamp_ms: i64,
    source: SourceId,
}

impl PositionSample {
    /// Create a new sample.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
        timestamp_ms: i64,
        source: SourceId,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp_ms,
            source,
        }
    }

    /// Tag a raw adapter position with its source.
    pub fn from_raw(raw: RawPosition, source: SourceId) -> Self {
        Self::new(
            raw.latitude,
            raw.longitude,
            raw.accuracy_m,
            raw.timestamp_ms,
            source,
        )
    }

    /// Latitude in degrees.
    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Accuracy radius in meters.
    #[inline]
    pub fn accuracy_m(&self) -> f64 {
        self.accuracy_m
    }

    /// Timestamp in milliseconds (source clock).
    #[inline]
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Source that produced this sample.
    #[inline]
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Position as a (latitude, longitude) tuple.
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// True if both samples report exactly the same coordinates.
    pub fn same_position(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl fmt::Display for PositionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Latitude: {:.6}, Longitude: {:.6} (±{:.0}m, {})",
            self.latitude, self.longitude, self.accuracy_m, self.source
        )
    }
}
