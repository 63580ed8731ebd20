//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`replay`] - Feed a recorded position file through the pipeline
//! - [`run`] - Main command (fix service with live sources)

pub mod common;
pub mod config;
pub mod replay;
pub mod run;
