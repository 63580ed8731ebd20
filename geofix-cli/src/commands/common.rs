//! Shared formatting and argument parsing for commands.

use chrono::{DateTime, Local};

use geofix::engine::BestFix;
use geofix::pipeline::FixStats;

use crate::error::CliError;

/// One console line for a best-fix change.
pub fn format_fix(fix: &BestFix) -> String {
    let time = DateTime::from_timestamp_millis(fix.timestamp_ms())
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| fix.timestamp_ms().to_string());

    let mut line = format!("{}  {}", time, fix);
    if let Some(motion) = fix.motion() {
        match motion.bearing_deg {
            Some(bearing) => line.push_str(&format!(
                "  trk {:.0}° {:.1} m/s",
                bearing, motion.speed_mps
            )),
            None => line.push_str(&format!("  {:.1} m/s", motion.speed_mps)),
        }
    }
    line
}

/// Multi-line counter summary printed when a command ends.
pub fn format_summary(stats: &FixStats) -> String {
    let v = &stats.validator;
    let e = &stats.engine;
    let p = &stats.publisher;

    [
        format!("Samples processed:    {}", stats.processed()),
        format!(
            "  rejected:           {} (range {}, accuracy {}, coarse {}, regression {}, dup {})",
            v.rejected(),
            v.out_of_range,
            v.invalid_accuracy,
            v.accuracy_too_coarse,
            v.timestamp_regression,
            v.duplicates
        ),
        format!(
            "  kept best:          {} (hysteresis {}, outdated {}, ceiling {})",
            e.below_hysteresis + e.outdated + e.above_ceiling,
            e.below_hysteresis,
            e.outdated,
            e.above_ceiling
        ),
        format!(
            "Fixes accepted:       {} ({} after staleness)",
            e.accepted, e.stale_recoveries
        ),
        format!("Fixes published:      {}", p.published),
        format!("Deliveries dropped:   {}", p.dropped),
        format!("Queue overflow drops: {}", stats.queue_dropped),
        format!("Discarded at stop:    {}", stats.discarded_on_shutdown),
    ]
    .join("\n")
}

/// Parse `LAT,LON` in decimal degrees.
pub fn parse_coordinates(value: &str) -> Result<(f64, f64), CliError> {
    let invalid = || {
        CliError::InvalidArgument(format!(
            "'{}' is not a position, expected LAT,LON in decimal degrees",
            value
        ))
    };

    let (lat, lon) = value.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(invalid());
    }
    Ok((lat, lon))
}
