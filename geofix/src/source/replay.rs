//! Replay source - plays recorded positions back.
//!
//! Record format, one per line:
//!
//! ```text
//! # timestamp_ms,source,latitude,longitude,accuracy_m
//! 0,gps,53.630278,9.988333,10
//! 1000,network,53.630400,9.988100,50
//! ```
//!
//! Blank lines and `#` comments are ignored. Recorded timestamps are rebased
//! onto the wall clock at start, keeping their relative spacing.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{SampleSink, SourceAdapter, SourceError, SourceHandle};
use crate::sample::{RawPosition, SourceId};
use crate::time::now_millis;

/// How recorded spacing is reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Sleep between records as recorded.
    #[default]
    RealTime,
    /// Emit everything immediately.
    AsFastAsPossible,
}

/// One recorded position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayRecord {
    pub source: SourceId,
    pub position: RawPosition,
}

/// Parse replay text into records, in file order.
pub fn parse_replay(text: &str) -> Result<Vec<ReplayRecord>, SourceError> {
    let mut records = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        records.push(parse_line(line).map_err(|reason| SourceError::Replay {
            line: index + 1,
            reason,
        })?);
    }

    Ok(records)
}

/// Read and parse a replay file.
pub fn load_replay(path: &Path) -> Result<Vec<ReplayRecord>, SourceError> {
    let text = std::fs::read_to_string(path)?;
    parse_replay(&text)
}

fn parse_line(line: &str) -> Result<ReplayRecord, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    let timestamp_ms: i64 = fields[0]
        .parse()
        .map_err(|_| format!("invalid timestamp '{}'", fields[0]))?;
    let source: SourceId = fields[1]
        .parse()
        .map_err(|_| format!("unknown source '{}'", fields[1]))?;
    let number = |field: &str, name: &str| -> Result<f64, String> {
        field
            .parse()
            .map_err(|_| format!("invalid {} '{}'", name, field))
    };

    Ok(ReplayRecord {
        source,
        position: RawPosition::new(
            number(fields[2], "latitude")?,
            number(fields[3], "longitude")?,
            number(fields[4], "accuracy")?,
            timestamp_ms,
        ),
    })
}

/// One replay adapter per source present in `records`.
///
/// All adapters share the first record's timestamp as time base, so their
/// relative timing is preserved.
pub fn replay_sources(records: &[ReplayRecord], pacing: Pacing) -> Vec<ReplaySource> {
    let sources: BTreeSet<SourceId> = records.iter().map(|r| r.source).collect();
    sources
        .into_iter()
        .map(|source| ReplaySource::new(source, records, pacing))
        .collect()
}

/// Adapter replaying the records of one source.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    source: SourceId,
    positions: Vec<RawPosition>,
    base_ms: i64,
    pacing: Pacing,
}

impl ReplaySource {
    /// Replay the records tagged `source`. The first record of the whole
    /// list is the time base.
    pub fn new(source: SourceId, records: &[ReplayRecord], pacing: Pacing) -> Self {
        let base_ms = records.first().map_or(0, |r| r.position.timestamp_ms);
        let positions = records
            .iter()
            .filter(|r| r.source == source)
            .map(|r| r.position)
            .collect();

        Self {
            source,
            positions,
            base_ms,
            pacing,
        }
    }

    /// Number of positions to replay.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if there is nothing to replay.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    async fn run(self, sink: SampleSink, cancel: CancellationToken) -> Result<(), SourceError> {
        let start_wall_ms = now_millis();
        let start = tokio::time::Instant::now();
        let mut replayed = 0usize;

        for position in &self.positions {
            let offset_ms = position.timestamp_ms.saturating_sub(self.base_ms).max(0);

            match self.pacing {
                Pacing::RealTime => {
                    let due = Duration::from_millis(offset_ms.unsigned_abs());
                    let wait = due.saturating_sub(start.elapsed());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Pacing::AsFastAsPossible => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }

            sink.submit(RawPosition {
                timestamp_ms: start_wall_ms.saturating_add(offset_ms),
                ..*position
            });
            replayed += 1;
        }

        tracing::info!(
            source = %self.source,
            replayed,
            total = self.positions.len(),
            "Replay finished"
        );
        Ok(())
    }
}

impl SourceAdapter for ReplaySource {
    fn source_id(&self) -> SourceId {
        self.source
    }

    fn start(self: Box<Self>, sink: SampleSink) -> SourceHandle {
        SourceHandle::spawn(move |cancel| self.run(sink, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::IngestionQueue;
    use std::sync::Arc;

    const RECORDING: &str = "\
# timestamp_ms,source,latitude,longitude,accuracy_m
0,gps,53.5,10.0,10

1000,network,53.51,10.0,50
2000, gps ,53.52,10.0,8
13000,network,53.53,10.0,100
";

    #[test]
    fn test_parse_recording() {
        let records = parse_replay(RECORDING).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].source, SourceId::Gps);
        assert_eq!(records[2].source, SourceId::Gps);
        assert_eq!(records[3].position.timestamp_ms, 13_000);
        assert_eq!(records[3].position.accuracy_m, 100.0);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_replay("0,gps,53.5,10.0,10\n# note\n1000,gps,north,10.0,10\n").unwrap_err();
        match err {
            SourceError::Replay { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("latitude"));
            }
            other => panic!("expected replay error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_source_and_field_count() {
        assert!(parse_replay("0,satellite,53.5,10.0,10").is_err());
        assert!(parse_replay("0,gps,53.5,10.0").is_err());
    }

    #[test]
    fn test_one_adapter_per_source() {
        let records = parse_replay(RECORDING).unwrap();
        let sources = replay_sources(&records, Pacing::AsFastAsPossible);

        let ids: Vec<SourceId> = sources.iter().map(|s| s.source_id()).collect();
        assert_eq!(ids, vec![SourceId::Gps, SourceId::Network]);
        assert_eq!(sources[0].len(), 2);
        assert_eq!(sources[1].len(), 2);
    }

    #[test]
    fn test_load_replay_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("track.csv");
        std::fs::write(&path, RECORDING).unwrap();

        assert_eq!(load_replay(&path).unwrap().len(), 4);
        assert!(matches!(
            load_replay(&dir.path().join("missing.csv")),
            Err(SourceError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_fast_replay_rebases_timestamps() {
        let records = parse_replay(RECORDING).unwrap();
        let source = ReplaySource::new(SourceId::Network, &records, Pacing::AsFastAsPossible);

        let queue = Arc::new(IngestionQueue::new(8));
        let before = now_millis();
        let handle = Box::new(source).start(SampleSink::new(SourceId::Network, Arc::clone(&queue)));
        handle.join().await.unwrap();

        let samples: Vec<_> = queue.drain().collect();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].timestamp_ms() >= before + 1_000);
        assert_eq!(samples[1].timestamp_ms() - samples[0].timestamp_ms(), 12_000);
    }

    #[tokio::test]
    async fn test_fast_replay_saturates_extreme_timestamps() {
        let text = format!("{},gps,53.5,10.0,10\n{},gps,53.6,10.0,10\n", i64::MIN, i64::MAX);
        let records = parse_replay(&text).unwrap();
        let source = ReplaySource::new(SourceId::Gps, &records, Pacing::AsFastAsPossible);

        let queue = Arc::new(IngestionQueue::new(8));
        let handle = Box::new(source).start(SampleSink::new(SourceId::Gps, Arc::clone(&queue)));
        handle.join().await.unwrap();

        let samples: Vec<_> = queue.drain().collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp_ms(), i64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_pacing() {
        let records = parse_replay(RECORDING).unwrap();
        let source = ReplaySource::new(SourceId::Gps, &records, Pacing::RealTime);

        let queue = Arc::new(IngestionQueue::new(8));
        let start = tokio::time::Instant::now();
        let handle = Box::new(source).start(SampleSink::new(SourceId::Gps, Arc::clone(&queue)));
        handle.join().await.unwrap();

        // Second GPS record is 2s after the time base
        assert!(start.elapsed() >= Duration::from_millis(2_000));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_real_time_replay() {
        let records = parse_replay(RECORDING).unwrap();
        let source = ReplaySource::new(SourceId::Network, &records, Pacing::RealTime);

        let queue = Arc::new(IngestionQueue::new(8));
        let handle = Box::new(source).start(SampleSink::new(SourceId::Network, Arc::clone(&queue)));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.stop().await.unwrap();
        assert_eq!(queue.len(), 1);
    }
}
