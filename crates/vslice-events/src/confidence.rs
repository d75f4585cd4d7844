//! Confidence aggregation
//!
//! Scores live in [0, 1]. Every update is `clamp(previous + delta)`, so a
//! single delta can never push a score outside the range, not even briefly.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use vslice_model::{ProjectId, SliceId};

/// Entity a score belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreKey {
    /// Project-level score
    Project(ProjectId),
    /// Slice-level score
    Slice(SliceId),
}

/// Apply one delta to a score
///
/// NaN deltas leave the score unchanged; infinities saturate.
#[inline]
#[must_use]
pub fn clamp_step(previous: f64, delta: f64) -> f64 {
    if delta.is_nan() {
        return previous;
    }
    (previous + delta).clamp(0.0, 1.0)
}

/// Running confidence scores keyed by project or slice
#[derive(Debug)]
pub struct ConfidenceAggregator {
    scores: DashMap<ScoreKey, f64>,
    threshold: f64,
}

impl ConfidenceAggregator {
    /// Create an aggregator with a completion threshold
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            scores: DashMap::new(),
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Apply a signed delta and return the new score
    pub fn apply_delta(&self, key: ScoreKey, delta: f64) -> f64 {
        let mut entry = self.scores.entry(key).or_insert(0.0);
        *entry = clamp_step(*entry, delta);
        *entry
    }

    /// Current score (0 when never touched)
    #[must_use]
    pub fn score(&self, key: ScoreKey) -> f64 {
        self.scores.get(&key).map_or(0.0, |s| *s)
    }

    /// Whether the score reached the completion threshold
    #[must_use]
    pub fn is_complete(&self, key: ScoreKey) -> bool {
        self.score(key) >= self.threshold
    }

    /// Completion threshold
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Restore a persisted score (e.g. after a restart)
    pub fn seed(&self, key: ScoreKey, score: f64) {
        self.scores.insert(key, clamp_step(0.0, score));
    }

    /// Delta that moves `key` to `target`
    #[must_use]
    pub fn delta_to(&self, key: ScoreKey, target: f64) -> f64 {
        target.clamp(0.0, 1.0) - self.score(key)
    }

    /// Delta whose application leaves `key` at or above `target`
    ///
    /// Unlike [`delta_to`](Self::delta_to) this never lands one ulp short
    /// of `target` through rounding.
    #[must_use]
    pub fn delta_reaching(&self, key: ScoreKey, target: f64) -> f64 {
        let target = target.clamp(0.0, 1.0);
        let score = self.score(key);
        let mut delta = target - score;
        while clamp_step(score, delta) < target {
            delta += f64::EPSILON;
        }
        delta
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new(0.85)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamps_at_both_ends() {
        let agg = ConfidenceAggregator::default();
        let key = ScoreKey::Slice(SliceId::new());

        assert_eq!(agg.apply_delta(key, 0.4), 0.4);
        assert_eq!(agg.apply_delta(key, 5.0), 1.0);
        assert_eq!(agg.apply_delta(key, -7.5), 0.0);
        assert_eq!(agg.apply_delta(key, -0.1), 0.0);
    }

    #[test]
    fn nan_and_infinite_deltas() {
        assert_eq!(clamp_step(0.3, f64::NAN), 0.3);
        assert_eq!(clamp_step(0.3, f64::INFINITY), 1.0);
        assert_eq!(clamp_step(0.3, f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn completion_threshold() {
        let agg = ConfidenceAggregator::new(0.85);
        let key = ScoreKey::Project(ProjectId::new());

        agg.apply_delta(key, 0.84);
        assert!(!agg.is_complete(key));
        agg.apply_delta(key, 0.01);
        assert!(agg.is_complete(key));
    }

    #[test]
    fn keys_are_independent() {
        let agg = ConfidenceAggregator::default();
        let a = ScoreKey::Slice(SliceId::new());
        let b = ScoreKey::Slice(SliceId::new());

        agg.apply_delta(a, 0.5);
        assert_eq!(agg.score(b), 0.0);
    }

    #[test]
    fn seed_and_delta_to() {
        let agg = ConfidenceAggregator::default();
        let key = ScoreKey::Slice(SliceId::new());
        agg.seed(key, 0.6);
        assert_eq!(agg.score(key), 0.6);

        let delta = agg.delta_to(key, 0.9);
        assert!((agg.apply_delta(key, delta) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn delta_reaching_does_not_round_short() {
        let agg = ConfidenceAggregator::new(0.85);
        let key = ScoreKey::Slice(SliceId::new());
        agg.apply_delta(key, 0.059);

        let delta = agg.delta_reaching(key, 0.85);
        assert!(agg.apply_delta(key, delta) >= 0.85);
        assert!(agg.is_complete(key));
    }

    proptest! {
        #[test]
        fn prop_delta_reaching_meets_target(start in 0.0f64..=1.0, target in 0.0f64..=1.0) {
            let agg = ConfidenceAggregator::new(target);
            let key = ScoreKey::Slice(SliceId::new());
            agg.seed(key, start);
            let delta = agg.delta_reaching(key, target);
            prop_assert!(agg.apply_delta(key, delta) >= target);
            prop_assert!(agg.is_complete(key));
        }

        #[test]
        fn prop_score_stays_in_unit_interval(
            deltas in proptest::collection::vec(
                prop_oneof![
                    -1.0f64..1.0,
                    -1.0e9f64..1.0e9,
                    Just(f64::MAX),
                    Just(f64::MIN),
                ],
                0..200,
            )
        ) {
            let agg = ConfidenceAggregator::default();
            let key = ScoreKey::Slice(SliceId::new());
            let mut expected = 0.0f64;
            for delta in deltas {
                let got = agg.apply_delta(key, delta);
                expected = (expected + delta).min(1.0).max(0.0);
                prop_assert!((0.0..=1.0).contains(&got));
                prop_assert_eq!(got, expected);
            }
        }
    }
}
