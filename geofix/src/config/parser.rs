//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::sample::SourceId;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
/// Range checks are left to [`super::FusionConfig::validate`].
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [engine] section
    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("max_accuracy_m") {
            config.engine.max_accuracy_m =
                parse_value("engine", "max_accuracy_m", v, "must be a number (meters)")?;
        }
        if let Some(v) = section.get("stale_timeout_ms") {
            config.engine.stale_timeout_ms =
                parse_value("engine", "stale_timeout_ms", v, "must be an integer (ms)")?;
        }
        if let Some(v) = section.get("hysteresis_margin") {
            config.engine.hysteresis_margin =
                parse_value("engine", "hysteresis_margin", v, "must be a number")?;
        }
        if let Some(v) = section.get("recency_half_life_ms") {
            config.engine.recency_half_life_ms =
                parse_value("engine", "recency_half_life_ms", v, "must be an integer (ms)")?;
        }
        if let Some(v) = section.get("trail_capacity") {
            config.engine.trail_capacity = parse_value(
                "engine",
                "trail_capacity",
                v,
                "must be a non-negative integer",
            )?;
        }
    }

    // [weights] section
    if let Some(section) = ini.section(Some("weights")) {
        if let Some(v) = section.get("accuracy") {
            config.weights.accuracy = parse_value("weights", "accuracy", v, "must be a number")?;
        }
        if let Some(v) = section.get("recency") {
            config.weights.recency = parse_value("weights", "recency", v, "must be a number")?;
        }
        if let Some(v) = section.get("source") {
            config.weights.source = parse_value("weights", "source", v, "must be a number")?;
        }
    }

    // [priority] section
    if let Some(section) = ini.section(Some("priority")) {
        for (key, v) in section.iter() {
            let source: SourceId = key.parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "priority".to_string(),
                key: key.to_string(),
                value: v.to_string(),
                reason: "unknown source, must be one of: gps, network, fused, passive, manual"
                    .to_string(),
            })?;
            let priority = parse_value("priority", key, v, "must be an integer")?;
            config.priority.set(source, priority);
        }
    }

    // [queue] section
    if let Some(section) = ini.section(Some("queue")) {
        if let Some(v) = section.get("capacity") {
            config.queue.capacity =
                parse_value("queue", "capacity", v, "must be a positive integer")?;
        }
    }

    // [validator] section
    if let Some(section) = ini.section(Some("validator")) {
        if let Some(v) = section.get("timestamp_grace_ms") {
            config.validator.timestamp_grace_ms =
                parse_value("validator", "timestamp_grace_ms", v, "must be an integer (ms)")?;
        }
        if let Some(v) = section.get("duplicate_window_ms") {
            config.validator.duplicate_window_ms =
                parse_value("validator", "duplicate_window_ms", v, "must be an integer (ms)")?;
        }
    }

    // [service] section
    if let Some(section) = ini.section(Some("service")) {
        if let Some(v) = section.get("subscriber_buffer") {
            config.service.subscriber_buffer = parse_value(
                "service",
                "subscriber_buffer",
                v,
                "must be a positive integer",
            )?;
        }
        if let Some(v) = section.get("stale_check_interval_ms") {
            config.service.stale_check_interval_ms = parse_value(
                "service",
                "stale_check_interval_ms",
                v,
                "must be a positive integer (ms)",
            )?;
        }
        if let Some(v) = section.get("drain_on_shutdown") {
            config.service.drain_on_shutdown = parse_bool(v);
        }
    }

    // [foreflight] section
    if let Some(section) = ini.section(Some("foreflight")) {
        if let Some(v) = section.get("enabled") {
            config.foreflight.enabled = parse_bool(v);
        }
        if let Some(v) = section.get("port") {
            config.foreflight.port =
                parse_value("foreflight", "port", v, "must be a port number (1-65535)")?;
        }
        if let Some(v) = section.get("accuracy_m") {
            config.foreflight.accuracy_m =
                parse_value("foreflight", "accuracy_m", v, "must be a number (meters)")?;
        }
        if let Some(v) = section.get("source") {
            config.foreflight.source = parse_value(
                "foreflight",
                "source",
                v,
                "must be one of: gps, network, fused, passive, manual",
            )?;
        }
        if let Some(v) = section.get("min_update_interval_ms") {
            config.foreflight.min_update_interval_ms = parse_value(
                "foreflight",
                "min_update_interval_ms",
                v,
                "must be a non-negative integer (ms)",
            )?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("debug") {
            config.logging.debug = parse_bool(v);
        }
        if let Some(v) = section.get("stdout") {
            config.logging.stdout = parse_bool(v);
        }
    }

    Ok(config)
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        })
}

/// Parse a boolean value from config string.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
