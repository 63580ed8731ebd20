//! Run command - start the fix service with the configured sources.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use geofix::engine::{BestFix, EngineState};
use geofix::logger::{spawn_fix_logger, DEFAULT_LOG_INTERVAL};
use geofix::service::FixService;
use geofix::source::{ForeFlightConfig, ForeFlightSource, SourceEvent};

use super::common::{format_fix, format_summary, parse_coordinates};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub debug: bool,
    /// Enable the ForeFlight receiver even if disabled in config.
    pub foreflight: bool,
    /// Override the ForeFlight UDP port (implies `foreflight`).
    pub port: Option<u16>,
    /// Last known position, `LAT,LON`.
    pub seed: Option<String>,
    pub seed_accuracy_m: f64,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let seed = args.seed.as_deref().map(parse_coordinates).transpose()?;

    let runner = CliRunner::with_debug(args.debug)?;
    runner.log_startup("run");

    let runtime = runner.runtime()?;
    runtime.block_on(run_service(&runner, &args, seed))
}

async fn run_service(
    runner: &CliRunner,
    args: &RunArgs,
    seed: Option<(f64, f64)>,
) -> Result<(), CliError> {
    let service = FixService::start(runner.fusion_config())?;
    let cancellation = CancellationToken::new();

    service.on_best_fix_changed("console", |fix: &BestFix| println!("{}", format_fix(fix)))?;
    tokio::spawn(print_source_events(
        service.source_events(),
        cancellation.clone(),
    ));
    if tracing::enabled!(tracing::Level::DEBUG) {
        spawn_fix_logger(service.snapshots(), cancellation.clone(), DEFAULT_LOG_INTERVAL);
    }

    let mut foreflight = runner.config().foreflight.clone();
    foreflight.enabled |= args.foreflight || args.port.is_some();
    if let Some(port) = args.port {
        foreflight.port = port;
    }

    if foreflight.enabled {
        let config = ForeFlightConfig::from(&foreflight);
        println!(
            "Listening for ForeFlight broadcasts on UDP port {} (as {}, ±{:.0}m)",
            config.port, config.source, config.accuracy_m
        );
        service.register_source(Box::new(ForeFlightSource::new(config)))?;
    } else {
        println!("No position source enabled.");
        println!("Pass --foreflight or set 'enabled = true' in the [foreflight] config section.");
    }

    if let Some((latitude, longitude)) = seed {
        service.seed_last_known(latitude, longitude, args.seed_accuracy_m)?;
    }

    println!("Press Ctrl+C to stop");
    println!();

    let result = wait_for_ctrl_c(&service).await;

    println!();
    println!("Shutting down...");
    cancellation.cancel();
    let stats = service.shutdown().await;
    println!("{}", format_summary(&stats));

    result
}

/// Print engine state changes until Ctrl+C.
async fn wait_for_ctrl_c(service: &FixService) -> Result<(), CliError> {
    let mut snapshots = service.snapshots();
    let mut last_state = EngineState::Empty;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => return result.map_err(CliError::Signal),
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = snapshots.borrow_and_update().state;
                if state != last_state {
                    if state == EngineState::Stale {
                        println!("Best fix is stale, accepting the next valid sample");
                    }
                    last_state = state;
                }
            }
        }
    }
}

async fn print_source_events(
    mut events: broadcast::Receiver<SourceEvent>,
    cancellation: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            event = events.recv() => match event {
                Ok(SourceEvent::Down { source, reason }) => {
                    println!("Source {} stopped: {}", source, reason);
                }
                Ok(event) => println!("Source {}", event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
