//! Fix pipeline - validator, engine and publisher in sequence.
//!
//! Owned by the single consumer task. Nothing in here locks except the
//! publisher hand-off, so one pass over a drained batch never waits on
//! producers or subscribers.

use crate::config::FusionConfig;
use crate::engine::{
    BestFix, Decision, EngineRejection, EngineState, EngineStats, StalenessEngine, StateTransition,
};
use crate::publisher::{FixPublisher, PublisherStats};
use crate::sample::PositionSample;
use crate::validator::{Rejection, Validator, ValidatorStats, Verdict};

/// What happened to one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Became the new best fix and was published.
    Published(BestFix),
    /// Failed validation.
    Invalid(Rejection),
    /// Valid, but the current best was kept.
    Discarded(EngineRejection),
}

impl Outcome {
    /// The published fix, if any.
    pub fn fix(&self) -> Option<&BestFix> {
        match self {
            Self::Published(fix) => Some(fix),
            _ => None,
        }
    }
}

/// Aggregated pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixStats {
    pub validator: ValidatorStats,
    pub engine: EngineStats,
    pub publisher: PublisherStats,
    /// Samples evicted from the ingestion queue before processing.
    pub queue_dropped: u64,
    /// Samples still queued at shutdown and discarded unprocessed.
    pub discarded_on_shutdown: u64,
}

impl FixStats {
    /// Samples that reached the validator.
    pub fn processed(&self) -> u64 {
        self.validator.accepted + self.validator.rejected()
    }
}

/// Validator → engine → publisher.
#[derive(Debug)]
pub struct FixPipeline {
    validator: Validator,
    engine: StalenessEngine,
    publisher: FixPublisher,
}

impl FixPipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: &FusionConfig, publisher: FixPublisher) -> Self {
        Self::from_parts(
            Validator::new(config.validator_config()),
            StalenessEngine::new(config.engine_config(), config.scorer()),
            publisher,
        )
    }

    /// Assemble from already configured parts.
    pub fn from_parts(
        validator: Validator,
        engine: StalenessEngine,
        publisher: FixPublisher,
    ) -> Self {
        Self {
            validator,
            engine,
            publisher,
        }
    }

    /// Process one sample at engine time `now_ms`.
    pub fn process(&mut self, sample: PositionSample, now_ms: i64) -> Outcome {
        if let Verdict::Rejected(rejection) = self.validator.validate(&sample) {
            return Outcome::Invalid(rejection);
        }

        match self.engine.offer(sample, now_ms) {
            Decision::Accepted { fix, .. } => {
                self.publisher.publish(&fix);
                Outcome::Published(fix)
            }
            Decision::Rejected(rejection) => {
                tracing::trace!(
                    source = %sample.source(),
                    reason = %rejection,
                    "Sample kept out by engine"
                );
                Outcome::Discarded(rejection)
            }
        }
    }

    /// Detect staleness at `now_ms`.
    pub fn poll(&mut self, now_ms: i64) -> Option<StateTransition> {
        self.engine.poll(now_ms)
    }

    /// Drop the best fix and the validator's history.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.validator.reset();
    }

    /// Current best fix.
    pub fn best_fix(&self) -> Option<&BestFix> {
        self.engine.current()
    }

    /// Engine state as of the last process/poll.
    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    /// The publisher fixes are handed to.
    pub fn publisher(&self) -> &FixPublisher {
        &self.publisher
    }

    /// Counters of all stages.
    pub fn stats(&self) -> FixStats {
        FixStats {
            validator: self.validator.stats(),
            engine: self.engine.stats(),
            publisher: self.publisher.stats(),
            ..Default::default()
        }
    }
}
