//! Sample scoring over accuracy, recency and source priority.
//!
//! ```text
//! score = w_accuracy * (1 / accuracy_m)
//!       + w_recency  * 0.5 ^ (age_ms / recency_half_life_ms)
//!       + w_source   * priority(source)
//! ```

use std::collections::BTreeMap;

use crate::config::{
    DEFAULT_RECENCY_HALF_LIFE_MS, DEFAULT_WEIGHT_ACCURACY, DEFAULT_WEIGHT_RECENCY,
    DEFAULT_WEIGHT_SOURCE,
};
use crate::sample::{PositionSample, SourceId};

/// Floor applied to accuracy radii so a zero radius has a finite score.
pub const MIN_ACCURACY_M: f64 = 0.1;

/// Weights of the three score terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub accuracy: f64,
    pub recency: f64,
    pub source: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            accuracy: DEFAULT_WEIGHT_ACCURACY,
            recency: DEFAULT_WEIGHT_RECENCY,
            source: DEFAULT_WEIGHT_SOURCE,
        }
    }
}

/// Relative preference between sources (higher wins).
///
/// Defaults to FUSED > GPS > NETWORK > PASSIVE = MANUAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    priorities: BTreeMap<SourceId, i32>,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::from_pairs([
            (SourceId::Fused, 3),
            (SourceId::Gps, 2),
            (SourceId::Network, 1),
            (SourceId::Passive, 0),
            (SourceId::Manual, 0),
        ])
    }
}

impl SourcePriority {
    /// Build from explicit pairs; unlisted sources have priority 0.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (SourceId, i32)>) -> Self {
        Self {
            priorities: pairs.into_iter().collect(),
        }
    }

    /// Priority of a source.
    pub fn get(&self, source: SourceId) -> i32 {
        self.priorities.get(&source).copied().unwrap_or(0)
    }

    /// Override one source's priority.
    pub fn set(&mut self, source: SourceId, priority: i32) {
        self.priorities.insert(source, priority);
    }

    /// Builder-style override.
    pub fn with(mut self, source: SourceId, priority: i32) -> Self {
        self.set(source, priority);
        self
    }

    /// Iterate over all sources with their priority.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, i32)> + '_ {
        SourceId::ALL.into_iter().map(|s| (s, self.get(s)))
    }
}

/// Computes sample scores.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoreWeights,
    priority: SourcePriority,
    recency_half_life_ms: i64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(
            ScoreWeights::default(),
            SourcePriority::default(),
            DEFAULT_RECENCY_HALF_LIFE_MS,
        )
    }
}

impl Scorer {
    /// Create a scorer. A non-positive half life is treated as 1 ms.
    pub fn new(weights: ScoreWeights, priority: SourcePriority, recency_half_life_ms: i64) -> Self {
        Self {
            weights,
            priority,
            recency_half_life_ms: recency_half_life_ms.max(1),
        }
    }

    /// Score weights.
    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Source priorities.
    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    /// Score a sample as seen at `now_ms`.
    pub fn score(&self, sample: &PositionSample, now_ms: i64) -> f64 {
        let accuracy = sample.accuracy_m().max(MIN_ACCURACY_M);
        self.weights.accuracy * (1.0 / accuracy)
            + self.weights.recency * self.recency_factor(sample.timestamp_ms(), now_ms)
            + self.weights.source * f64::from(self.priority.get(sample.source()))
    }

    /// Exponential decay in (0, 1]; 1.0 for samples not older than `now_ms`.
    pub fn recency_factor(&self, timestamp_ms: i64, now_ms: i64) -> f64 {
        let age_ms = now_ms.saturating_sub(timestamp_ms).max(0);
        0.5_f64.powf(age_ms as f64 / self.recency_half_life_ms as f64)
    }
}
