//! Project model
//!
//! A project is created once per migration request and is never deleted;
//! it only moves between [`ProjectStatus`] values.

use crate::error::TransitionError;
use crate::ids::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Created, nothing run yet
    Pending,
    /// Analysis stages running
    Processing,
    /// Analysis finished; waiting for external configuration
    Analyzed,
    /// Configured; planning may run
    Ready,
    /// Slices are being built
    Building,
    /// Every slice completed
    Complete,
    /// Halted with an error context
    Failed,
    /// Paused between stage/slice boundaries
    Paused,
}

impl ProjectStatus {
    /// Statuses reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [ProjectStatus] {
        use ProjectStatus::*;
        match self {
            Pending => &[Processing, Paused, Failed],
            Processing => &[Analyzed, Paused, Failed],
            Analyzed => &[Ready, Paused, Failed],
            Ready => &[Building, Paused, Failed],
            Building => &[Complete, Paused, Failed],
            Complete => &[],
            Failed => &[Processing, Ready, Building],
            Paused => &[Pending, Processing, Analyzed, Ready, Building],
        }
    }

    /// Check that `self -> to` is a legal move
    ///
    /// # Errors
    /// Returns [`TransitionError`] when the move is not in the table.
    pub fn validate_transition(self, to: ProjectStatus) -> Result<(), TransitionError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(TransitionError::new("project", self, to))
        }
    }

    /// Whether no further pipeline work will happen without outside action
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Complete | ProjectStatus::Failed)
    }

    /// Snake-case name, as serialized
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Analyzed => "analyzed",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Building => "building",
            ProjectStatus::Complete => "complete",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure record carried by a failed project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Pipeline step that failed
    pub step: String,
    /// Human-readable message
    pub message: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Whether re-invoking the same step may succeed
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context stamped with the current time
    #[must_use]
    pub fn new(step: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            timestamp: Utc::now(),
            retryable,
        }
    }
}

/// A migration project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier
    pub id: ProjectId,
    /// Display name
    pub name: String,
    /// Current status
    pub status: ProjectStatus,
    /// Name of the current pipeline step
    pub pipeline_step: Option<String>,
    /// Aggregate confidence in [0, 1]
    pub confidence_score: f64,
    /// Set when the project failed
    pub error_context: Option<ErrorContext>,
    /// Combined analysis stage results, persisted once all stages settle
    pub analysis: Option<serde_json::Value>,
    /// Status to return to on resume
    pub paused_from: Option<ProjectStatus>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new pending project
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            name: name.into(),
            status: ProjectStatus::Pending,
            pipeline_step: None,
            confidence_score: 0.0,
            error_context: None,
            analysis: None,
            paused_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, checking the transition table
    ///
    /// # Errors
    /// Returns [`TransitionError`] for an illegal move; the project is unchanged.
    pub fn transition(&mut self, to: ProjectStatus) -> Result<(), TransitionError> {
        if self.status == to {
            return Ok(());
        }
        self.status.validate_transition(to)?;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the current pipeline step
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.pipeline_step = Some(step.into());
        self.updated_at = Utc::now();
    }

    /// Mark failed with a structured error context
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the project cannot fail from its status
    /// (only `complete` projects).
    pub fn fail(&mut self, context: ErrorContext) -> Result<(), TransitionError> {
        self.transition(ProjectStatus::Failed)?;
        self.pipeline_step = Some(context.step.clone());
        self.error_context = Some(context);
        Ok(())
    }

    /// Pause, remembering where to resume
    ///
    /// # Errors
    /// Returns [`TransitionError`] for terminal projects.
    pub fn pause(&mut self) -> Result<(), TransitionError> {
        if self.status == ProjectStatus::Paused {
            return Ok(());
        }
        let from = self.status;
        self.transition(ProjectStatus::Paused)?;
        self.paused_from = Some(from);
        Ok(())
    }

    /// Resume to the status held before [`Project::pause`]
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the project is not paused.
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        let Some(target) = self.paused_from else {
            return Err(TransitionError::new("project", self.status, "resumed"));
        };
        self.transition(target)?;
        self.paused_from = None;
        Ok(())
    }

    /// Clear a recorded failure before retrying
    pub fn clear_error(&mut self) {
        self.error_context = None;
        self.updated_at = Utc::now();
    }
}
