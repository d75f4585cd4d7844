//! Pipeline checkpoint
//!
//! Invariant: a step is listed in `completed_steps` iff its result is in
//! `stage_results`. Deserialization enforces it, so a checkpoint read back
//! from storage is either consistent or rejected.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ways a checkpoint can break its invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointViolation {
    /// Step listed twice
    #[error("step {0} listed more than once")]
    DuplicateStep(String),

    /// Step listed without a result
    #[error("step {0} is completed but has no result")]
    MissingResult(String),

    /// Result stored for a step that is not listed
    #[error("result stored for unlisted step {0}")]
    OrphanResult(String),
}

/// Record of completed pipeline steps and their results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CheckpointRecord")]
pub struct Checkpoint {
    completed_steps: IndexSet<String>,
    stage_results: BTreeMap<String, serde_json::Value>,
    last_updated: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Create an empty checkpoint
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `step` as complete with `result`
    ///
    /// Idempotent: a repeated step keeps its original position and only its
    /// result is replaced. Returns `true` if the step was newly added.
    pub fn record(&mut self, step: impl Into<String>, result: serde_json::Value) -> bool {
        let step = step.into();
        self.stage_results.insert(step.clone(), result);
        self.last_updated = Some(Utc::now());
        self.completed_steps.insert(step)
    }

    /// Whether `step` has completed
    #[inline]
    #[must_use]
    pub fn is_complete(&self, step: &str) -> bool {
        self.completed_steps.contains(step)
    }

    /// Result stored for `step`
    #[inline]
    #[must_use]
    pub fn result(&self, step: &str) -> Option<&serde_json::Value> {
        self.stage_results.get(step)
    }

    /// Completed steps in completion order
    pub fn completed_steps(&self) -> impl Iterator<Item = &str> {
        self.completed_steps.iter().map(String::as_str)
    }

    /// All results by step name
    #[inline]
    #[must_use]
    pub fn stage_results(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.stage_results
    }

    /// Time of the last recorded step
    #[inline]
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether nothing has completed yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed_steps.is_empty()
    }

    /// Number of completed steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed_steps.len()
    }

    /// Check the step/result invariant
    ///
    /// # Errors
    /// Returns the first [`CheckpointViolation`] found.
    pub fn validate(&self) -> Result<(), CheckpointViolation> {
        for step in &self.completed_steps {
            if !self.stage_results.contains_key(step) {
                return Err(CheckpointViolation::MissingResult(step.clone()));
            }
        }
        for step in self.stage_results.keys() {
            if !self.completed_steps.contains(step) {
                return Err(CheckpointViolation::OrphanResult(step.clone()));
            }
        }
        Ok(())
    }
}

/// Wire form; duplicates are only visible before they reach the set
#[derive(Deserialize)]
struct CheckpointRecord {
    #[serde(default)]
    completed_steps: Vec<String>,
    #[serde(default)]
    stage_results: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl TryFrom<CheckpointRecord> for Checkpoint {
    type Error = CheckpointViolation;

    fn try_from(record: CheckpointRecord) -> Result<Self, Self::Error> {
        let mut completed_steps = IndexSet::with_capacity(record.completed_steps.len());
        for step in record.completed_steps {
            if completed_steps.contains(&step) {
                return Err(CheckpointViolation::DuplicateStep(step));
            }
            completed_steps.insert(step);
        }
        let checkpoint = Checkpoint {
            completed_steps,
            stage_results: record.stage_results,
            last_updated: record.last_updated,
        };
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn record_is_idempotent() {
        let mut cp = Checkpoint::new();
        assert!(cp.record("code_analysis", json!({"files": 10})));
        assert!(cp.record("behavior_analysis", json!({"screens": 5})));
        assert!(!cp.record("code_analysis", json!({"files": 12})));

        let steps: Vec<_> = cp.completed_steps().collect();
        assert_eq!(steps, vec!["code_analysis", "behavior_analysis"]);
        assert_eq!(cp.result("code_analysis"), Some(&json!({"files": 12})));
        assert!(cp.validate().is_ok());
    }

    #[test]
    fn round_trips_through_json() {
        let mut cp = Checkpoint::new();
        cp.record("planning", json!([]));
        let text = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn rejects_duplicate_steps() {
        let text = r#"{"completed_steps":["a","a"],"stage_results":{"a":1}}"#;
        let err = serde_json::from_str::<Checkpoint>(text).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_step_without_result() {
        let text = r#"{"completed_steps":["a"],"stage_results":{}}"#;
        assert!(serde_json::from_str::<Checkpoint>(text).is_err());
    }

    #[test]
    fn rejects_orphan_result() {
        let text = r#"{"completed_steps":[],"stage_results":{"a":1}}"#;
        assert!(serde_json::from_str::<Checkpoint>(text).is_err());
    }

    proptest! {
        #[test]
        fn prop_steps_unique_and_backed_by_results(
            steps in proptest::collection::vec("[a-d]", 0..40)
        ) {
            let mut cp = Checkpoint::new();
            for (i, step) in steps.iter().enumerate() {
                cp.record(step.clone(), json!(i));
            }
            let listed: Vec<_> = cp.completed_steps().collect();
            let unique: std::collections::HashSet<_> = listed.iter().collect();
            prop_assert_eq!(unique.len(), listed.len());
            prop_assert!(cp.validate().is_ok());
            prop_assert_eq!(cp.len(), cp.stage_results().len());
        }
    }
}
