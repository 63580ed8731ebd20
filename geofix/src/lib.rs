//! GeoFix - location-fix aggregation and staleness engine
//!
//! Merges position samples from several sources (GPS, network, fused,
//! passive, manual seeds) into a single authoritative best fix, replaces it
//! only when a candidate is meaningfully better, detects staleness when no
//! acceptable fix arrives in time, and notifies subscribers on every change.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use geofix::config::FusionConfig;
//! use geofix::service::FixService;
//! use geofix::source::{ForeFlightConfig, ForeFlightSource};
//!
//! let service = FixService::start(FusionConfig::default())?;
//! service.register_source(Box::new(ForeFlightSource::new(ForeFlightConfig::default())))?;
//! service.on_best_fix_changed("ui", |fix: &geofix::engine::BestFix| println!("{}", fix))?;
//! ```
//!
//! The building blocks ([`queue`], [`validator`], [`engine`], [`publisher`],
//! [`pipeline`]) can also be driven directly with an explicit clock, which is
//! how the deterministic replay mode works.

pub mod config;
pub mod engine;
pub mod logger;
pub mod logging;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod sample;
pub mod service;
pub mod source;
pub mod time;
pub mod trail;
pub mod validator;

/// Version of the GeoFix library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
