//! Periodic best-fix logging daemon.
//!
//! Background task that logs the current best fix at a regular interval,
//! useful for post-session analysis of source switching and staleness.
//!
//! # Usage
//!
//! ```ignore
//! use geofix::logger::{spawn_fix_logger, DEFAULT_LOG_INTERVAL};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancellation = CancellationToken::new();
//! if tracing::enabled!(tracing::Level::DEBUG) {
//!     spawn_fix_logger(service.snapshots(), cancellation.clone(), DEFAULT_LOG_INTERVAL);
//! }
//! ```
//!
//! # Output Format
//!
//! Logs are emitted at DEBUG level with structured fields:
//! - `fix_seq` - Sequence number of the best fix
//! - `lat`, `lon` - Position in decimal degrees
//! - `accuracy_m` - Reported accuracy in meters
//! - `source` - Source that produced the fix
//! - `state` - Engine state (tracking, stale)
//! - `age_ms` - Time since the fix was accepted
//! - `bearing_deg`, `speed_mps` - Derived motion, when available

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::FixSnapshot;
use crate::time::now_millis;

/// Default logging interval (20 seconds).
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(20);

/// Spawns a background task that periodically logs the best fix.
///
/// Runs until `cancellation` is triggered or the snapshot sender is gone.
pub fn spawn_fix_logger(
    snapshots: watch::Receiver<FixSnapshot>,
    cancellation: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if snapshots.has_changed().is_err() {
                        tracing::debug!("Fix logger stopped, service gone");
                        break;
                    }
                    log_snapshot(&snapshots.borrow(), now_millis());
                }
                _ = cancellation.cancelled() => {
                    tracing::debug!("Fix logger stopped");
                    break;
                }
            }
        }
    })
}

fn log_snapshot(snapshot: &FixSnapshot, now_ms: i64) {
    let Some(fix) = &snapshot.best_fix else {
        tracing::debug!(state = %snapshot.state, "Fix update (no fix)");
        return;
    };

    let sample = fix.sample();
    let motion = fix.motion();
    tracing::debug!(
        fix_seq = fix.fix_seq(),
        lat = sample.latitude(),
        lon = sample.longitude(),
        accuracy_m = sample.accuracy_m(),
        source = %sample.source(),
        state = %snapshot.state,
        age_ms = now_ms.saturating_sub(fix.accepted_at_ms()),
        bearing_deg = ?motion.and_then(|m| m.bearing_deg),
        speed_mps = ?motion.map(|m| m.speed_mps),
        "Fix update"
    );
}
