//! Staleness/debounce engine - maintains the best known position.
//!
//! The engine owns the current [`BestFix`] and decides, for every validated
//! sample, whether it supersedes the current best. It runs single-threaded on
//! the consumer side and takes the current time explicitly, so decisions are
//! deterministic and need no locking.
//!
//! # Acceptance rules
//!
//! A sample replaces the current best iff:
//! 1. there is no current best, or
//! 2. its score beats the score the current best was accepted with by more
//!    than the hysteresis margin, or
//! 3. the current best is stale (nothing accepted for longer than the stale
//!    timeout), in which case the sample is accepted regardless of score.
//!
//! A sample older than the current best is never accepted, and a sample
//! above the accuracy ceiling never becomes best.
//!
//! # States
//!
//! ```text
//!            accept              no accept within timeout
//!  Empty ──────────► Tracking ─────────────────────────► Stale
//!    ▲                  ▲                                  │
//!    │ reset            └──────────── accept ──────────────┘
//!    └──────────────── (from any state)
//! ```

mod score;

pub use score::{ScoreWeights, Scorer, SourcePriority, MIN_ACCURACY_M};

use std::fmt;

use thiserror::Error;

use crate::config::{
    DEFAULT_HYSTERESIS_MARGIN, DEFAULT_MAX_ACCURACY_M, DEFAULT_STALE_TIMEOUT_MS,
    DEFAULT_TRAIL_CAPACITY,
};
use crate::sample::PositionSample;
use crate::trail::{FixTrail, Motion};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No fix accepted since creation or the last reset.
    #[default]
    Empty,
    /// A fix was accepted within the stale timeout.
    Tracking,
    /// The current fix has not been replaced within the stale timeout.
    Stale,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Tracking => write!(f, "Tracking"),
            Self::Stale => write!(f, "Stale"),
        }
    }
}

/// The currently accepted authoritative position.
#[derive(Debug, Clone, PartialEq)]
pub struct BestFix {
    sample: PositionSample,
    fix_seq: u64,
    score: f64,
    accepted_at_ms: i64,
    motion: Option<Motion>,
}

impl BestFix {
    /// The accepted sample.
    pub fn sample(&self) -> &PositionSample {
        &self.sample
    }

    /// Sequence number, strictly increasing across all accepted fixes.
    pub fn fix_seq(&self) -> u64 {
        self.fix_seq
    }

    /// Score at the moment of acceptance.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Engine time (ms) at which the fix was accepted.
    pub fn accepted_at_ms(&self) -> i64 {
        self.accepted_at_ms
    }

    /// Motion derived from the trail window, if available.
    pub fn motion(&self) -> Option<Motion> {
        self.motion
    }

    /// Sample timestamp (source clock).
    pub fn timestamp_ms(&self) -> i64 {
        self.sample.timestamp_ms()
    }
}

impl fmt::Display for BestFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.fix_seq, self.sample)
    }
}

/// Which rule admitted a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRule {
    /// There was no current best.
    First,
    /// Score beat the current best by more than the hysteresis margin.
    Improved,
    /// The current best was stale; accepted regardless of score.
    StaleRecovery,
}

/// Why the engine kept the current best.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineRejection {
    /// Not enough improvement over the current best.
    #[error("score {score:.4} does not beat {baseline:.4} by more than {margin}")]
    BelowHysteresis {
        score: f64,
        baseline: f64,
        margin: f64,
    },

    /// Older than the current best.
    #[error("timestamp {timestamp_ms}ms is older than current fix at {current_ms}ms")]
    Outdated { timestamp_ms: i64, current_ms: i64 },

    /// Above the accuracy ceiling.
    #[error("accuracy {accuracy_m}m above ceiling {max_m}m")]
    AboveCeiling { accuracy_m: f64, max_m: f64 },
}

/// Result of offering a sample to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The sample became the new best fix.
    Accepted { fix: BestFix, rule: AcceptRule },
    /// The current best was kept.
    Rejected(EngineRejection),
}

/// A state change observed by [`StalenessEngine::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub accepted: u64,
    pub stale_recoveries: u64,
    pub below_hysteresis: u64,
    pub outdated: u64,
    pub above_ceiling: u64,
    pub resets: u64,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Samples coarser than this never become best.
    pub max_accuracy_m: f64,
    /// Time without an accepted replacement after which the fix is stale.
    pub stale_timeout_ms: i64,
    /// Minimum score improvement required to replace the current best.
    pub hysteresis_margin: f64,
    /// Number of accepted fixes kept for motion derivation.
    pub trail_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            stale_timeout_ms: DEFAULT_STALE_TIMEOUT_MS,
            hysteresis_margin: DEFAULT_HYSTERESIS_MARGIN,
            trail_capacity: DEFAULT_TRAIL_CAPACITY,
        }
    }
}

/// Staleness/debounce engine.
#[derive(Debug)]
pub struct StalenessEngine {
    config: EngineConfig,
    scorer: Scorer,
    current: Option<BestFix>,
    last_accepted_at: Option<i64>,
    last_seq: u64,
    state: EngineState,
    trail: FixTrail,
    stats: EngineStats,
}

impl Default for StalenessEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default(), Scorer::default())
    }
}

impl StalenessEngine {
    /// Create an engine in the `Empty` state.
    pub fn new(config: EngineConfig, scorer: Scorer) -> Self {
        let trail = FixTrail::new(config.trail_capacity);
        Self {
            config,
            scorer,
            current: None,
            last_accepted_at: None,
            last_seq: 0,
            state: EngineState::Empty,
            trail,
            stats: EngineStats::default(),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The scorer used for decisions.
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// The current best fix.
    pub fn current(&self) -> Option<&BestFix> {
        self.current.as_ref()
    }

    /// Engine time of the last accepted replacement.
    pub fn last_accepted_at(&self) -> Option<i64> {
        self.last_accepted_at
    }

    /// State as of the last `offer`/`poll`.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// State as it would be at `now_ms`, without mutating the engine.
    pub fn state_at(&self, now_ms: i64) -> EngineState {
        match self.current {
            None => EngineState::Empty,
            Some(_) if self.is_stale_at(now_ms) => EngineState::Stale,
            Some(_) => EngineState::Tracking,
        }
    }

    /// Counters since creation.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Detect a `Tracking -> Stale` transition at `now_ms`.
    ///
    /// Called from a timer so staleness is noticed even when no samples arrive.
    pub fn poll(&mut self, now_ms: i64) -> Option<StateTransition> {
        let next = self.state_at(now_ms);
        if next == self.state {
            return None;
        }

        let transition = StateTransition {
            from: self.state,
            to: next,
        };
        self.state = next;

        if next == EngineState::Stale {
            tracing::warn!(
                stale_timeout_ms = self.config.stale_timeout_ms,
                last_accepted_at = ?self.last_accepted_at,
                "Best fix is stale"
            );
        }
        Some(transition)
    }

    /// Offer a validated sample at engine time `now_ms`.
    pub fn offer(&mut self, sample: PositionSample, now_ms: i64) -> Decision {
        self.poll(now_ms);

        if sample.accuracy_m() > self.config.max_accuracy_m {
            self.stats.above_ceiling += 1;
            return Decision::Rejected(EngineRejection::AboveCeiling {
                accuracy_m: sample.accuracy_m(),
                max_m: self.config.max_accuracy_m,
            });
        }

        let score = self.scorer.score(&sample, now_ms);

        let rule = match &self.current {
            None => AcceptRule::First,
            Some(current) => {
                if sample.timestamp_ms() < current.timestamp_ms() {
                    self.stats.outdated += 1;
                    return Decision::Rejected(EngineRejection::Outdated {
                        timestamp_ms: sample.timestamp_ms(),
                        current_ms: current.timestamp_ms(),
                    });
                }

                if self.state == EngineState::Stale {
                    AcceptRule::StaleRecovery
                } else {
                    let baseline = current.score();
                    if score - baseline > self.config.hysteresis_margin {
                        AcceptRule::Improved
                    } else {
                        self.stats.below_hysteresis += 1;
                        return Decision::Rejected(EngineRejection::BelowHysteresis {
                            score,
                            baseline,
                            margin: self.config.hysteresis_margin,
                        });
                    }
                }
            }
        };

        let fix = self.accept(sample, score, now_ms);
        if rule == AcceptRule::StaleRecovery {
            self.stats.stale_recoveries += 1;
            tracing::info!(
                fix_seq = fix.fix_seq(),
                source = %sample.source(),
                accuracy_m = sample.accuracy_m(),
                "Recovered from stale fix"
            );
        }
        Decision::Accepted { fix, rule }
    }

    /// Drop the current fix and return to `Empty`.
    ///
    /// The fix sequence keeps counting from where it was.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_accepted_at = None;
        self.state = EngineState::Empty;
        self.trail.clear();
        self.stats.resets += 1;
        tracing::info!(last_seq = self.last_seq, "Engine reset");
    }

    fn accept(&mut self, sample: PositionSample, score: f64, now_ms: i64) -> BestFix {
        self.last_seq += 1;
        self.trail.record(sample);

        let fix = BestFix {
            sample,
            fix_seq: self.last_seq,
            score,
            accepted_at_ms: now_ms,
            motion: self.trail.motion(),
        };

        self.current = Some(fix.clone());
        self.last_accepted_at = Some(now_ms);
        self.state = EngineState::Tracking;
        self.stats.accepted += 1;

        tracing::debug!(
            fix_seq = fix.fix_seq,
            source = %sample.source(),
            lat = sample.latitude(),
            lon = sample.longitude(),
            accuracy_m = sample.accuracy_m(),
            score,
            "Best fix replaced"
        );
        fix
    }

    fn is_stale_at(&self, now_ms: i64) -> bool {
        self.last_accepted_at
            .is_some_and(|at| now_ms.saturating_sub(at) > self.config.stale_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SourceId;

    fn sample(source: SourceId, accuracy: f64, ts: i64) -> PositionSample {
        PositionSample::new(53.5 + ts as f64 * 1e-6, 10.0, accuracy, ts, source)
    }

    fn accepted(decision: &Decision) -> Option<&BestFix> {
        match decision {
            Decision::Accepted { fix, .. } => Some(fix),
            Decision::Rejected(_) => None,
        }
    }

    #[test]
    fn test_new_engine_is_empty() {
        let engine = StalenessEngine::default();
        assert_eq!(engine.state(), EngineState::Empty);
        assert!(engine.current().is_none());
        assert_eq!(engine.state_at(1_000_000), EngineState::Empty);
    }

    #[test]
    fn test_first_sample_accepted() {
        let mut engine = StalenessEngine::default();
        let decision = engine.offer(sample(SourceId::Network, 150.0, 0), 0);

        match decision {
            Decision::Accepted { fix, rule } => {
                assert_eq!(rule, AcceptRule::First);
                assert_eq!(fix.fix_seq(), 1);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
        assert_eq!(engine.state(), EngineState::Tracking);
    }

    #[test]
    fn test_reference_scenario() {
        let mut engine = StalenessEngine::default();

        // A: GPS 10m at t=0
        let a = engine.offer(sample(SourceId::Gps, 10.0, 0), 0);
        assert_eq!(accepted(&a).map(|f| f.fix_seq()), Some(1));

        // B: NETWORK 50m at t=1000 scores lower
        let b = engine.offer(sample(SourceId::Network, 50.0, 1_000), 1_000);
        assert!(matches!(
            b,
            Decision::Rejected(EngineRejection::BelowHysteresis { .. })
        ));
        assert_eq!(engine.current().map(|f| f.fix_seq()), Some(1));

        // C: GPS 8m at t=2000
        let c = engine.offer(sample(SourceId::Gps, 8.0, 2_000), 2_000);
        assert_eq!(accepted(&c).map(|f| f.fix_seq()), Some(2));

        // 11s without input
        assert_eq!(
            engine.poll(13_000),
            Some(StateTransition {
                from: EngineState::Tracking,
                to: EngineState::Stale
            })
        );
        assert_eq!(engine.state(), EngineState::Stale);

        // D: NETWORK 100m at t=13000, accepted regardless of score
        match engine.offer(sample(SourceId::Network, 100.0, 13_000), 13_000) {
            Decision::Accepted { fix, rule } => {
                assert_eq!(rule, AcceptRule::StaleRecovery);
                assert_eq!(fix.fix_seq(), 3);
            }
            other => panic!("expected stale recovery, got {:?}", other),
        }
        assert_eq!(engine.state(), EngineState::Tracking);
        assert_eq!(engine.stats().stale_recoveries, 1);
    }

    #[test]
    fn test_stale_detected_lazily_on_offer() {
        let mut engine = StalenessEngine::default();
        engine.offer(sample(SourceId::Gps, 5.0, 0), 0);

        // No poll in between; the offer itself notices staleness
        let decision = engine.offer(sample(SourceId::Passive, 190.0, 10_001), 10_001);
        assert!(matches!(
            decision,
            Decision::Accepted {
                rule: AcceptRule::StaleRecovery,
                ..
            }
        ));
    }

    #[test]
    fn test_exactly_at_timeout_is_not_stale() {
        let mut engine = StalenessEngine::default();
        engine.offer(sample(SourceId::Gps, 5.0, 0), 0);

        assert_eq!(engine.poll(10_000), None);
        assert_eq!(engine.state(), EngineState::Tracking);
        assert_eq!(engine.state_at(10_001), EngineState::Stale);
    }

    #[test]
    fn test_hysteresis_blocks_marginal_improvement() {
        let config = EngineConfig {
            hysteresis_margin: 0.05,
            ..Default::default()
        };
        let mut engine = StalenessEngine::new(config, Scorer::default());
        engine.offer(sample(SourceId::Gps, 10.0, 0), 0);

        // 1/8 - 1/10 = 0.025 improvement, inside the 0.05 margin
        let decision = engine.offer(sample(SourceId::Gps, 8.0, 0), 0);
        match decision {
            Decision::Rejected(EngineRejection::BelowHysteresis {
                score,
                baseline,
                margin,
            }) => {
                assert!(score > baseline);
                assert!(score - baseline < margin);
            }
            other => panic!("expected hysteresis rejection, got {:?}", other),
        }

        // 1/5 - 1/10 = 0.1 improvement clears the margin
        let decision = engine.offer(sample(SourceId::Gps, 5.0, 0), 0);
        assert!(matches!(
            decision,
            Decision::Accepted {
                rule: AcceptRule::Improved,
                ..
            }
        ));
    }

    #[test]
    fn test_marginal_gain_over_retained_score_is_rejected() {
        let mut engine = StalenessEngine::default();
        let first = engine.offer(sample(SourceId::Gps, 10.0, 0), 0);
        let retained = accepted(&first).map(BestFix::score).unwrap();
        let margin = engine.config().hysteresis_margin;

        // Scores between the retained score and retained + margin never replace it
        let candidate = sample(SourceId::Gps, 9.7, 3_000);
        let candidate_score = engine.scorer().score(&candidate, 3_000);
        assert!(candidate_score > retained && candidate_score < retained + margin);

        let decision = engine.offer(candidate, 3_000);
        match decision {
            Decision::Rejected(EngineRejection::BelowHysteresis { baseline, .. }) => {
                assert_eq!(baseline, retained);
            }
            other => panic!("expected hysteresis rejection, got {:?}", other),
        }

        // The retained score does not decay, so waiting does not help either
        let later = engine.offer(sample(SourceId::Gps, 10.0, 9_000), 9_000);
        assert!(accepted(&later).is_none());
        assert_eq!(engine.current().map(BestFix::score), Some(retained));
    }

    #[test]
    fn test_equal_quality_replaces_only_after_stale() {
        let mut engine = StalenessEngine::default();
        engine.offer(sample(SourceId::Gps, 10.0, 0), 0);

        let fresh = engine.offer(sample(SourceId::Gps, 10.0, 5_000), 5_000);
        assert!(accepted(&fresh).is_none());

        match engine.offer(sample(SourceId::Gps, 10.0, 10_500), 10_500) {
            Decision::Accepted { fix, rule } => {
                assert_eq!(rule, AcceptRule::StaleRecovery);
                assert_eq!(fix.fix_seq(), 2);
            }
            other => panic!("expected stale recovery, got {:?}", other),
        }
    }

    #[test]
    fn test_outdated_sample_rejected_even_when_stale() {
        let mut engine = StalenessEngine::default();
        engine.offer(sample(SourceId::Gps, 10.0, 5_000), 5_000);

        let decision = engine.offer(sample(SourceId::Fused, 1.0, 4_000), 30_000);
        assert_eq!(
            decision,
            Decision::Rejected(EngineRejection::Outdated {
                timestamp_ms: 4_000,
                current_ms: 5_000
            })
        );
        assert_eq!(engine.stats().outdated, 1);
    }

    #[test]
    fn test_above_ceiling_never_becomes_best() {
        let config = EngineConfig {
            max_accuracy_m: 50.0,
            ..Default::default()
        };
        let mut engine = StalenessEngine::new(config, Scorer::default());

        // Not even into an empty engine
        let decision = engine.offer(sample(SourceId::Gps, 51.0, 0), 0);
        assert!(matches!(
            decision,
            Decision::Rejected(EngineRejection::AboveCeiling { .. })
        ));
        assert!(engine.current().is_none());

        // Nor as a stale recovery
        engine.offer(sample(SourceId::Gps, 10.0, 0), 0);
        let decision = engine.offer(sample(SourceId::Gps, 60.0, 20_000), 20_000);
        assert!(accepted(&decision).is_none());
    }

    #[test]
    fn test_reset_keeps_sequence_increasing() {
        let mut engine = StalenessEngine::default();
        engine.offer(sample(SourceId::Gps, 10.0, 50_000), 50_000);
        engine.offer(sample(SourceId::Fused, 3.0, 51_000), 51_000);

        engine.reset();
        assert_eq!(engine.state(), EngineState::Empty);
        assert!(engine.current().is_none());

        // An older timestamp is fine after reset, and the sequence continues
        let decision = engine.offer(sample(SourceId::Network, 80.0, 0), 0);
        assert_eq!(accepted(&decision).map(|f| f.fix_seq()), Some(3));
        assert_eq!(engine.stats().resets, 1);
    }

    #[test]
    fn test_poll_reports_each_transition_once() {
        let mut engine = StalenessEngine::default();
        assert_eq!(engine.poll(0), None);

        engine.offer(sample(SourceId::Gps, 10.0, 0), 0);
        assert!(engine.poll(20_000).is_some());
        assert_eq!(engine.poll(30_000), None);
    }

    #[test]
    fn test_accepted_fix_carries_motion() {
        let mut engine = StalenessEngine::default();
        engine.offer(PositionSample::new(0.0, 0.0, 10.0, 0, SourceId::Gps), 0);

        // Far better accuracy, ~111m north, 10s later
        let decision = engine.offer(
            PositionSample::new(0.001, 0.0, 2.0, 10_000, SourceId::Gps),
            10_000,
        );
        let motion = accepted(&decision).and_then(|f| f.motion()).unwrap();
        assert!(motion.bearing_deg.unwrap() < 0.1);
        assert!((motion.speed_mps - 11.12).abs() < 0.05);
    }

    #[test]
    fn test_sequence_strictly_increasing() {
        let mut engine = StalenessEngine::default();
        let mut last_seq = 0;
        let mut now = 0;

        for i in 0..200_i64 {
            now += 700;
            let accuracy = 5.0 + (i % 7) as f64 * 10.0;
            let source = SourceId::ALL[(i % 5) as usize];
            let decision = engine.offer(sample(source, accuracy, now), now);
            if let Decision::Accepted { fix, .. } = decision {
                assert!(fix.fix_seq() > last_seq);
                last_seq = fix.fix_seq();
            }
        }
        assert!(last_seq > 1);
    }
}
