//! Slice model
//!
//! Slices are created in bulk by planning and mutated only by the build
//! loop that owns them.

use crate::error::TransitionError;
use crate::ids::{ProjectId, SliceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Build status of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceStatus {
    /// Waiting to be picked
    Pending,
    /// Picked for the next build
    Selected,
    /// Code generation and compile check
    Building,
    /// Running generated tests
    Testing,
    /// Diagnosing and applying a fix
    SelfHealing,
    /// Tests passed
    Complete,
    /// Retries exhausted
    Failed,
}

impl SliceStatus {
    /// Statuses reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [SliceStatus] {
        use SliceStatus::*;
        match self {
            Pending => &[Selected],
            Selected => &[Building, Pending],
            Building => &[Testing, Failed],
            Testing => &[Complete, SelfHealing, Failed],
            SelfHealing => &[Testing, Failed],
            Complete => &[],
            Failed => &[Pending],
        }
    }

    /// Check that `self -> to` is a legal move
    ///
    /// # Errors
    /// Returns [`TransitionError`] when the move is not in the table.
    pub fn validate_transition(self, to: SliceStatus) -> Result<(), TransitionError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(TransitionError::new("slice", self, to))
        }
    }

    /// Snake-case name, as serialized
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SliceStatus::Pending => "pending",
            SliceStatus::Selected => "selected",
            SliceStatus::Building => "building",
            SliceStatus::Testing => "testing",
            SliceStatus::SelfHealing => "self_healing",
            SliceStatus::Complete => "complete",
            SliceStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a slice must deliver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceContract {
    /// Short description of the behaviour being migrated
    pub summary: String,
    /// Acceptance criteria handed to code generation
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Number of tests the contract expects
    #[serde(default)]
    pub required_tests: u32,
}

impl SliceContract {
    /// Create a contract with a summary
    #[inline]
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// With acceptance criteria
    #[inline]
    #[must_use]
    pub fn with_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    /// With required test count
    #[inline]
    #[must_use]
    pub fn with_required_tests(mut self, count: u32) -> Self {
        self.required_tests = count;
        self
    }
}

/// An independently buildable unit of the target application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Slice identifier
    pub id: SliceId,
    /// Owning project
    pub project_id: ProjectId,
    /// Display name
    pub name: String,
    /// Slices that must be complete first
    pub dependencies: BTreeSet<SliceId>,
    /// Tie-break ordering; lower builds first
    pub priority: u32,
    /// Current status
    pub status: SliceStatus,
    /// Confidence in [0, 1]
    pub confidence_score: f64,
    /// Heal attempts made in the current build
    pub retry_count: u32,
    /// Delivery contract
    pub contract: SliceContract,
    /// Paths of files written by the last successful build
    #[serde(default)]
    pub files: Vec<String>,
    /// Why the last build failed
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Slice {
    /// Create a pending slice
    #[must_use]
    pub fn new(project_id: ProjectId, name: impl Into<String>, contract: SliceContract) -> Self {
        Self {
            id: SliceId::new(),
            project_id,
            name: name.into(),
            dependencies: BTreeSet::new(),
            priority: 0,
            status: SliceStatus::Pending,
            confidence_score: 0.0,
            retry_count: 0,
            contract,
            files: Vec::new(),
            failure_reason: None,
        }
    }

    /// With dependency
    #[inline]
    #[must_use]
    pub fn depends_on(mut self, slice: SliceId) -> Self {
        self.dependencies.insert(slice);
        self
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Move to `to`, checking the transition table
    ///
    /// # Errors
    /// Returns [`TransitionError`] for an illegal move; the slice is unchanged.
    pub fn transition(&mut self, to: SliceStatus) -> Result<(), TransitionError> {
        if self.status == to {
            return Ok(());
        }
        self.status.validate_transition(to)?;
        self.status = to;
        Ok(())
    }

    /// Whether every dependency is in `completed`
    #[must_use]
    pub fn dependencies_met(&self, completed: &HashSet<SliceId>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Dependencies missing from `completed`
    #[must_use]
    pub fn unmet_dependencies(&self, completed: &HashSet<SliceId>) -> Vec<SliceId> {
        self.dependencies
            .iter()
            .filter(|dep| !completed.contains(dep))
            .copied()
            .collect()
    }

    /// Whether the slice reached `complete`
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == SliceStatus::Complete
    }

    /// Reset a failed slice for a manual retry
    ///
    /// # Errors
    /// Returns [`TransitionError`] unless the slice is `failed`.
    pub fn reset_for_retry(&mut self) -> Result<(), TransitionError> {
        if self.status != SliceStatus::Failed {
            return Err(TransitionError::new("slice", self.status, SliceStatus::Pending));
        }
        self.transition(SliceStatus::Pending)?;
        self.retry_count = 0;
        self.failure_reason = None;
        Ok(())
    }
}
