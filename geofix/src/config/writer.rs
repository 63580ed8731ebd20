//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use crate::sample::SourceId;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let priority = &config.priority;

    format!(
        r#"[engine]
; Samples with an accuracy radius above this (meters) are rejected (default: 200)
max_accuracy_m = {}
; Without an accepted update for this long (ms) the best fix becomes stale,
; and the next valid sample is accepted regardless of score (default: 10000)
stale_timeout_ms = {}
; Minimum score improvement needed to replace the best fix (default: 0.01)
hysteresis_margin = {}
; Age (ms) at which the recency term of the score halves (default: 5000)
recency_half_life_ms = {}
; Accepted fixes kept for bearing/speed derivation, 0 disables (default: 8)
trail_capacity = {}

[weights]
; score = accuracy * (1 / accuracy_m) + recency * 0.5^(age / half_life) + source * priority
accuracy = {}
recency = {}
source = {}

[priority]
; Relative source preference, higher wins
gps = {}
network = {}
fused = {}
passive = {}
manual = {}

[queue]
; Ingestion buffer size; when full the oldest sample is dropped (default: 64)
capacity = {}

[validator]
; Tolerated timestamp regression (ms) behind the last accepted sample (default: 2000)
timestamp_grace_ms = {}
; Identical positions from one source within this window (ms) are dropped (default: 500)
duplicate_window_ms = {}

[service]
; Hand-off buffer per subscriber; deliveries to a full subscriber are dropped (default: 32)
subscriber_buffer = {}
; Staleness check interval in ms (default: 250)
stale_check_interval_ms = {}
; Process samples still queued at shutdown (default: true)
drain_on_shutdown = {}

[foreflight]
; Receive ForeFlight XGPS broadcasts over UDP with `geofix run` (default: false)
enabled = {}
port = {}
; Accuracy radius (meters) assigned to received positions (default: 10)
accuracy_m = {}
; Source to register as: gps, network, fused, passive, manual (default: gps)
source = {}
; Minimum interval between emitted samples in ms (default: 2000)
min_update_interval_ms = {}

[logging]
; Log file location (default: ~/.geofix/geofix.log)
file = {}
; Force debug level, otherwise RUST_LOG or info (default: false)
debug = {}
; Mirror log output to the console (default: true)
stdout = {}
"#,
        config.engine.max_accuracy_m,
        config.engine.stale_timeout_ms,
        config.engine.hysteresis_margin,
        config.engine.recency_half_life_ms,
        config.engine.trail_capacity,
        config.weights.accuracy,
        config.weights.recency,
        config.weights.source,
        priority.get(SourceId::Gps),
        priority.get(SourceId::Network),
        priority.get(SourceId::Fused),
        priority.get(SourceId::Passive),
        priority.get(SourceId::Manual),
        config.queue.capacity,
        config.validator.timestamp_grace_ms,
        config.validator.duplicate_window_ms,
        config.service.subscriber_buffer,
        config.service.stale_check_interval_ms,
        config.service.drain_on_shutdown,
        config.foreflight.enabled,
        config.foreflight.port,
        config.foreflight.accuracy_m,
        config.foreflight.source,
        config.foreflight.min_update_interval_ms,
        path_to_string(&config.logging.file),
        config.logging.debug,
        config.logging.stdout,
    )
}

/// Render a path, abbreviating the home directory as `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ini::Ini;

    #[test]
    fn test_output_is_valid_ini() {
        let content = to_config_string(&ConfigFile::default());
        let ini = Ini::load_from_str(&content).unwrap();

        for section in [
            "engine",
            "weights",
            "priority",
            "queue",
            "validator",
            "service",
            "foreflight",
            "logging",
        ] {
            assert!(ini.section(Some(section)).is_some(), "missing [{}]", section);
        }
    }

    #[test]
    fn test_writes_current_values() {
        let mut config = ConfigFile::default();
        config.queue.capacity = 128;
        config.foreflight.source = SourceId::Fused;

        let content = to_config_string(&config);
        let ini = Ini::load_from_str(&content).unwrap();
        assert_eq!(ini.get_from(Some("queue"), "capacity"), Some("128"));
        assert_eq!(ini.get_from(Some("foreflight"), "source"), Some("fused"));
    }

    #[test]
    fn test_home_is_abbreviated() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                path_to_string(&home.join("geofix.log")),
                "~/geofix.log".to_string()
            );
        }
    }
}
