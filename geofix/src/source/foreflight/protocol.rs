//! ForeFlight broadcast protocol parsing.
//!
//! - **XGPS/XGPS2**: `XGPS<name>,lon,lat,alt_m,track,gs_m/s`
//! - **XATT/XATT2**: `XATT<name>,heading,pitch,roll` (recognised, carries no position)

use tracing::trace;

/// One parsed ForeFlight packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    Position(GpsReport),
    Attitude,
}

/// Position report from an XGPS packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsReport {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    /// Track over ground, degrees true in [0, 360).
    pub track_deg: f64,
    pub ground_speed_mps: f64,
}

/// Parse a packet. Returns `None` for unknown or malformed data.
pub fn parse_packet(data: &[u8]) -> Option<Packet> {
    if data.starts_with(b"XGPS") {
        return parse_xgps(data).map(Packet::Position);
    }
    if data.starts_with(b"XATT") {
        return parse_xatt(data);
    }
    None
}

/// Parse an XGPS message. The sender name runs up to the first comma, which
/// also covers the `XGPS2` variant.
fn parse_xgps(data: &[u8]) -> Option<GpsReport> {
    let text = std::str::from_utf8(data).ok()?;

    let parts: Vec<&str> = text.trim_end().split(',').collect();
    if parts.len() < 6 {
        trace!("XGPS packet too short: {} parts", parts.len());
        return None;
    }

    let longitude: f64 = parts[1].trim().parse().ok()?;
    let latitude: f64 = parts[2].trim().parse().ok()?;
    let altitude_m: f64 = parts[3].trim().parse().ok()?;
    let track: f64 = parts[4].trim().parse().ok()?;
    let ground_speed_mps: f64 = parts[5].trim().parse().ok()?;

    Some(GpsReport {
        latitude,
        longitude,
        altitude_m,
        track_deg: normalize_heading(track),
        ground_speed_mps,
    })
}

fn parse_xatt(data: &[u8]) -> Option<Packet> {
    let text = std::str::from_utf8(data).ok()?;

    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() < 4 {
        trace!("XATT packet too short: {} parts", parts.len());
        return None;
    }
    Some(Packet::Attitude)
}

/// Normalize a heading to [0, 360) degrees.
fn normalize_heading(heading: f64) -> f64 {
    heading.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(packet: &[u8]) -> GpsReport {
        match parse_packet(packet) {
            Some(Packet::Position(report)) => report,
            other => panic!("expected position, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_xgps() {
        let report = position(b"XGPSGeoFix,9.988333,53.630278,15.0,270.5,61.7");

        assert!((report.latitude - 53.630278).abs() < 1e-9);
        assert!((report.longitude - 9.988333).abs() < 1e-9);
        assert!((report.altitude_m - 15.0).abs() < 1e-9);
        assert!((report.track_deg - 270.5).abs() < 1e-9);
        assert!((report.ground_speed_mps - 61.7).abs() < 1e-9);
    }

    #[test]
    fn test_parse_xgps2() {
        let report = position(b"XGPS2X-Plane,-122.5,45.5,3048.0,-90.0,154.3\n");
        assert!((report.latitude - 45.5).abs() < 1e-9);
        assert!((report.track_deg - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_xatt_is_recognised_without_position() {
        assert_eq!(
            parse_packet(b"XATTX-Plane,45.5,5.2,-3.1"),
            Some(Packet::Attitude)
        );
        assert_eq!(
            parse_packet(b"XATT2X-Plane,45.5,5.2,-3.1"),
            Some(Packet::Attitude)
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_packet(b"XGPSX-Plane,-122.5,45.5,3048.0,270.5").is_none());
        assert!(parse_packet(b"XGPSX-Plane,west,45.5,3048.0,270.5,154.3").is_none());
        assert!(parse_packet(b"XATTX-Plane,45.5,5.2").is_none());
        assert!(parse_packet(b"DATA\x00").is_none());
        assert!(parse_packet(b"\xff\xfe").is_none());
    }

    #[test]
    fn test_normalize_heading() {
        assert!((normalize_heading(-90.0) - 270.0).abs() < 1e-9);
        assert!((normalize_heading(360.0) - 0.0).abs() < 1e-9);
        assert!((normalize_heading(450.0) - 90.0).abs() < 1e-9);
    }
}
