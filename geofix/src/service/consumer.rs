//! Consumer task - the single owner of the fix pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::FixSnapshot;
use crate::pipeline::{FixPipeline, FixStats, Outcome};
use crate::queue::IngestionQueue;
use crate::time::now_millis;

/// Commands sent to the consumer task.
#[derive(Debug)]
pub(super) enum Control {
    /// Reset engine and validator, acknowledging once done.
    Reset(oneshot::Sender<()>),
}

pub(super) struct Consumer {
    pub(super) pipeline: FixPipeline,
    pub(super) queue: Arc<IngestionQueue>,
    pub(super) snapshot_tx: watch::Sender<FixSnapshot>,
    pub(super) control_rx: mpsc::Receiver<Control>,
    pub(super) cancel: CancellationToken,
    pub(super) stale_check_interval: Duration,
    pub(super) drain_on_shutdown: bool,
}

impl Consumer {
    /// Run until cancelled, then drain and return the final counters.
    pub(super) async fn run(mut self) -> FixStats {
        let mut ticker = tokio::time::interval(self.stale_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(
            stale_check_interval_ms = self.stale_check_interval.as_millis() as u64,
            "Fix consumer started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(command) = self.control_rx.recv() => self.handle(command),

                _ = self.queue.notified() => self.process_pending(),

                _ = ticker.tick() => {
                    if let Some(transition) = self.pipeline.poll(now_millis()) {
                        tracing::debug!(
                            from = %transition.from,
                            to = %transition.to,
                            "Engine state changed"
                        );
                        self.publish_snapshot(0);
                    }
                }
            }
        }

        self.finish()
    }

    fn handle(&mut self, command: Control) {
        match command {
            Control::Reset(ack) => {
                // Everything submitted before the reset is part of the old session
                self.process_pending();
                self.pipeline.reset();
                tracing::info!("Fix pipeline reset");
                self.publish_snapshot(0);
                let _ = ack.send(());
            }
        }
    }

    fn process_pending(&mut self) {
        let mut processed = 0usize;
        for sample in self.queue.drain() {
            if let Outcome::Published(fix) = self.pipeline.process(sample, now_millis()) {
                tracing::debug!(
                    fix_seq = fix.fix_seq(),
                    source = %fix.sample().source(),
                    accuracy_m = fix.sample().accuracy_m(),
                    "Best fix changed"
                );
            }
            processed += 1;
        }
        if processed > 0 {
            self.publish_snapshot(0);
        }
    }

    fn finish(mut self) -> FixStats {
        let remaining = self.queue.drain();
        let mut discarded = 0;

        if self.drain_on_shutdown {
            let now_ms = now_millis();
            for sample in remaining {
                self.pipeline.process(sample, now_ms);
            }
        } else {
            discarded = remaining.len() as u64;
        }

        let stats = self.publish_snapshot(discarded);
        tracing::debug!(
            processed = stats.processed(),
            discarded_on_shutdown = stats.discarded_on_shutdown,
            "Fix consumer stopped"
        );
        stats
    }

    fn publish_snapshot(&self, discarded_on_shutdown: u64) -> FixStats {
        let mut stats = self.pipeline.stats();
        stats.queue_dropped = self.queue.dropped_count();
        stats.discarded_on_shutdown = discarded_on_shutdown;

        self.snapshot_tx.send_replace(FixSnapshot {
            best_fix: self.pipeline.best_fix().cloned(),
            state: self.pipeline.state(),
            stats,
        });
        stats
    }
}
