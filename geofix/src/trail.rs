//! Trail window - bounded history of accepted fixes.
//!
//! Keeps the last N accepted samples and derives motion (bearing and ground
//! speed) across the window. Only accepted fixes are recorded, so the trail
//! never contains rejected or superseded noise.
//!
//! Navigation math uses a spherical earth:
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Bearing: degrees true (0-360, 0=north, 90=east)
//! - Distance: meters

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::sample::PositionSample;

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

/// Minimum displacement before a bearing is meaningful.
const MIN_BEARING_DISTANCE_M: f64 = 1.0;

/// Motion derived from the trail window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Initial great-circle bearing from the oldest to the newest fix.
    /// `None` when the displacement is too small to have a direction.
    pub bearing_deg: Option<f64>,
    /// Average ground speed across the window.
    pub speed_mps: f64,
}

/// Bounded trailing window of accepted samples.
#[derive(Debug, Clone)]
pub struct FixTrail {
    points: VecDeque<PositionSample>,
    capacity: usize,
}

impl FixTrail {
    /// Create a trail holding at most `capacity` samples (0 disables it).
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an accepted sample, evicting the oldest when full.
    pub fn record(&mut self, sample: PositionSample) {
        if self.capacity == 0 {
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(sample);
    }

    /// Motion across the window, if at least two samples with a time gap exist.
    pub fn motion(&self) -> Option<Motion> {
        let oldest = self.points.front()?;
        let newest = self.points.back()?;

        let elapsed_ms = newest.timestamp_ms().saturating_sub(oldest.timestamp_ms());
        if elapsed_ms <= 0 {
            return None;
        }

        let distance = distance_m(oldest.coordinates(), newest.coordinates());
        let bearing_deg = (distance >= MIN_BEARING_DISTANCE_M)
            .then(|| bearing_between(oldest.coordinates(), newest.coordinates()));

        Some(Motion {
            bearing_deg,
            speed_mps: distance / (elapsed_ms as f64 / 1_000.0),
        })
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of samples kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all recorded samples.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Initial bearing from one position to another, in degrees [0, 360).
pub fn bearing_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    let bearing_deg = y.atan2(x) * RAD_TO_DEG;
    bearing_deg.rem_euclid(360.0)
}

/// Great-circle distance in meters (haversine).
pub fn distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SourceId;

    fn at(lat: f64, lon: f64, ts: i64) -> PositionSample {
        PositionSample::new(lat, lon, 10.0, ts, SourceId::Gps)
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing_between((0.0, 0.0), (1.0, 0.0)) - 0.0).abs() < 0.01);
        assert!((bearing_between((0.0, 0.0), (0.0, 1.0)) - 90.0).abs() < 0.01);
        assert!((bearing_between((0.0, 0.0), (-1.0, 0.0)) - 180.0).abs() < 0.01);
        assert!((bearing_between((0.0, 0.0), (0.0, -1.0)) - 270.0).abs() < 0.01);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // One degree of latitude is ~111.2km
        let dist = distance_m((0.0, 0.0), (1.0, 0.0));
        assert!((dist - 111_195.0).abs() < 50.0);
    }

    #[test]
    fn test_disabled_trail_records_nothing() {
        let mut trail = FixTrail::new(0);
        trail.record(at(0.0, 0.0, 0));
        assert!(trail.is_empty());
        assert!(trail.motion().is_none());
    }

    #[test]
    fn test_single_point_has_no_motion() {
        let mut trail = FixTrail::new(4);
        trail.record(at(0.0, 0.0, 0));
        assert!(trail.motion().is_none());
    }

    #[test]
    fn test_motion_north() {
        let mut trail = FixTrail::new(4);
        trail.record(at(0.0, 0.0, 0));
        // ~111m north after 10 seconds
        trail.record(at(0.001, 0.0, 10_000));

        let motion = trail.motion().unwrap();
        assert!((motion.bearing_deg.unwrap() - 0.0).abs() < 0.01);
        assert!((motion.speed_mps - 11.12).abs() < 0.05);
    }

    #[test]
    fn test_stationary_has_no_bearing() {
        let mut trail = FixTrail::new(4);
        trail.record(at(53.5, 10.0, 0));
        trail.record(at(53.5, 10.0, 5_000));

        let motion = trail.motion().unwrap();
        assert!(motion.bearing_deg.is_none());
        assert_eq!(motion.speed_mps, 0.0);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut trail = FixTrail::new(2);
        trail.record(at(0.0, 0.0, 0));
        trail.record(at(0.0, 0.001, 1_000));
        trail.record(at(0.0, 0.002, 2_000));

        assert_eq!(trail.len(), 2);
        // Window now spans 0.001 -> 0.002 over one second, heading east
        let motion = trail.motion().unwrap();
        assert!((motion.bearing_deg.unwrap() - 90.0).abs() < 0.01);
        assert!((motion.speed_mps - 111.2).abs() < 0.5);
    }

    #[test]
    fn test_motion_across_full_timestamp_range() {
        let mut trail = FixTrail::new(2);
        trail.record(at(0.0, 0.0, i64::MIN));
        trail.record(at(0.001, 0.0, i64::MAX));

        let motion = trail.motion().unwrap();
        assert!(motion.speed_mps >= 0.0 && motion.speed_mps < 1e-9);
    }

    #[test]
    fn test_clear() {
        let mut trail = FixTrail::new(2);
        trail.record(at(0.0, 0.0, 0));
        trail.clear();
        assert!(trail.is_empty());
        assert_eq!(trail.capacity(), 2);
    }
}
