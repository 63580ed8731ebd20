//! GeoFix CLI - Command-line interface
//!
//! This binary provides a command-line interface to the GeoFix library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::replay::ReplayArgs;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "geofix")]
#[command(version = geofix::VERSION)]
#[command(about = "Merge position sources into one staleness-aware fix", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fix service with the configured sources until Ctrl+C
    Run {
        /// Enable the ForeFlight UDP receiver even if disabled in config
        #[arg(long)]
        foreflight: bool,

        /// ForeFlight UDP port (implies --foreflight)
        #[arg(long)]
        port: Option<u16>,

        /// Seed a last known position, e.g. --seed 53.6303,9.9883
        #[arg(long, value_name = "LAT,LON", allow_hyphen_values = true)]
        seed: Option<String>,

        /// Accuracy radius of the seed position in meters
        #[arg(long, default_value_t = 100.0)]
        seed_accuracy: f64,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Replay a recorded position file (timestamp_ms,source,lat,lon,accuracy_m)
    Replay {
        /// Replay file
        file: PathBuf,

        /// Run the live service, paced as recorded, instead of a simulated clock
        #[arg(long)]
        realtime: bool,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            foreflight,
            port,
            seed,
            seed_accuracy,
            debug,
        } => commands::run::run(RunArgs {
            debug,
            foreflight,
            port,
            seed,
            seed_accuracy_m: seed_accuracy,
        }),
        Commands::Replay {
            file,
            realtime,
            debug,
        } => commands::replay::run(ReplayArgs {
            file,
            realtime,
            debug,
        }),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
