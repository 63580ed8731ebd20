//! Replay command - feed a recorded file through the pipeline.
//!
//! By default the pipeline is driven directly with each record's timestamp
//! as the clock, so a replay is deterministic and independent of how fast
//! the machine is (a 10 s gap in the file makes the fix stale even though
//! the replay takes milliseconds). `--realtime` instead runs the full fix
//! service with one replay adapter per source, paced as recorded.

use std::path::PathBuf;

use tokio::sync::broadcast;

use geofix::config::FusionConfig;
use geofix::engine::BestFix;
use geofix::pipeline::{FixPipeline, FixStats, Outcome};
use geofix::publisher::FixPublisher;
use geofix::sample::PositionSample;
use geofix::service::{FixService, ServiceError};
use geofix::source::{load_replay, replay_sources, Pacing, ReplayRecord, SourceEvent};

use super::common::{format_fix, format_summary};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the replay command.
#[derive(Debug)]
pub struct ReplayArgs {
    pub file: PathBuf,
    pub realtime: bool,
    pub debug: bool,
}

/// Run the replay command.
pub fn run(args: ReplayArgs) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(args.debug)?;
    runner.log_startup("replay");

    let records = load_replay(&args.file).map_err(|error| CliError::Replay {
        path: args.file.clone(),
        error,
    })?;
    println!(
        "Replaying {} records from {}",
        records.len(),
        args.file.display()
    );
    println!();

    let stats = if args.realtime {
        runner
            .runtime()?
            .block_on(replay_realtime(runner.fusion_config(), records))?
    } else {
        let (lines, stats) = replay_virtual(&runner.fusion_config(), &records)?;
        for line in lines {
            println!("{}", line);
        }
        stats
    };

    println!();
    println!("{}", format_summary(&stats));
    Ok(())
}

/// Drive the pipeline with record timestamps as the clock.
///
/// Returns one line per record (plus state changes) and the final counters.
fn replay_virtual(
    config: &FusionConfig,
    records: &[ReplayRecord],
) -> Result<(Vec<String>, FixStats), CliError> {
    config.validate().map_err(ServiceError::from)?;

    let mut pipeline = FixPipeline::new(config, FixPublisher::new(config.subscriber_buffer));
    let base_ms = records.first().map_or(0, |r| r.position.timestamp_ms);
    let mut lines = Vec::with_capacity(records.len());

    for record in records {
        let now_ms = record.position.timestamp_ms;
        let offset = format_offset(now_ms.saturating_sub(base_ms));

        if let Some(transition) = pipeline.poll(now_ms) {
            lines.push(format!(
                "{}  state {} -> {}",
                offset, transition.from, transition.to
            ));
        }

        let source = record.source.as_str();
        let sample = PositionSample::from_raw(record.position, record.source);
        let line = match pipeline.process(sample, now_ms) {
            Outcome::Published(fix) => format!("{}  {:<8} accepted {}", offset, source, fix),
            Outcome::Invalid(rejection) => {
                format!("{}  {:<8} rejected: {}", offset, source, rejection)
            }
            Outcome::Discarded(reason) => {
                format!("{}  {:<8} kept best: {}", offset, source, reason)
            }
        };
        lines.push(line);
    }

    Ok((lines, pipeline.stats()))
}

/// Run the full service with paced replay adapters until every one finishes.
async fn replay_realtime(
    config: FusionConfig,
    records: Vec<ReplayRecord>,
) -> Result<FixStats, CliError> {
    let service = FixService::start(config)?;
    service.on_best_fix_changed("console", |fix: &BestFix| println!("{}", format_fix(fix)))?;

    let mut events = service.source_events();
    let adapters = replay_sources(&records, Pacing::RealTime);
    let mut remaining = adapters.len();
    for adapter in adapters {
        service.register_source(Box::new(adapter))?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while remaining > 0 {
        tokio::select! {
            result = &mut ctrl_c => {
                result.map_err(CliError::Signal)?;
                println!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SourceEvent::Finished(_)) => remaining -= 1,
                Ok(SourceEvent::Down { source, reason }) => {
                    println!("Source {} stopped: {}", source, reason);
                    remaining -= 1;
                }
                Ok(SourceEvent::Up(_)) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(service.shutdown().await)
}

/// `+12.345s` relative to the first record.
fn format_offset(offset_ms: i64) -> String {
    format!("+{:>7.3}s", offset_ms as f64 / 1000.0)
}
