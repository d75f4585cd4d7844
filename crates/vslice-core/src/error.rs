//! Error types for vslice Core
//!
//! Failures are split by who can recover from them:
//! - [`StageError`]: one analysis stage; isolated, the others continue
//! - [`CollaboratorError`]: an external service call; fed into self-healing
//! - [`BuildLoopError`]: the build loop could not run or record a slice
//! - [`PipelineError`]: fatal to a `process` invocation

use vslice_events::EventError;
use vslice_model::{SliceId, TransitionError};
use vslice_store::StoreError;

/// Failure of a single analysis stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// Stage reported a failure
    #[error("stage failed: {0}")]
    Failed(String),

    /// Stage task panicked
    #[error("stage panicked: {0}")]
    Panicked(String),

    /// Stage exceeded its time budget
    #[error("stage timed out after {secs}s")]
    TimedOut {
        /// Budget that was exceeded
        secs: u64,
    },

    /// Result could not be checkpointed
    #[error("checkpoint write failed: {0}")]
    Checkpoint(String),
}

/// Failure of an external collaborator call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Service unreachable or overloaded
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// Service answered with an error
    #[error("collaborator failed: {0}")]
    Failed(String),

    /// Service answered with something unusable
    #[error("invalid collaborator response: {0}")]
    InvalidResponse(String),
}

/// Errors that stop the build loop before it reaches a terminal outcome
#[derive(Debug, thiserror::Error)]
pub enum BuildLoopError {
    /// Slice has dependencies that are not complete
    #[error("slice {slice} has unmet dependencies: {missing:?}")]
    DependenciesUnmet {
        /// Slice name
        slice: String,
        /// Dependencies not yet complete
        missing: Vec<SliceId>,
    },

    /// Another build of the same slice is running
    #[error("slice {0} is already being built")]
    AlreadyBuilding(SliceId),

    /// Illegal status change
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Event could not be recorded
    #[error("event append failed: {0}")]
    Event(#[from] EventError),

    /// Slice could not be persisted
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors fatal to a pipeline invocation
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Checkpoint failed its integrity check; resuming would be unsafe
    #[error("checkpoint for project {project} is corrupt: {reason}")]
    CheckpointCorruption {
        /// Project id
        project: vslice_model::ProjectId,
        /// What was wrong
        reason: String,
    },

    /// Event could not be recorded after retries
    #[error("event append failed: {0}")]
    EventAppend(#[from] EventError),

    /// Storage failure
    #[error("store error: {0}")]
    Store(StoreError),

    /// Illegal status change
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Invalid configuration or wiring
    #[error("configuration error: {0}")]
    Config(String),

    /// Slice build could not run
    #[error("build error: {0}")]
    Build(String),

    /// Operation not valid for the project's current status
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    /// Check if retrying the invocation could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EventAppend(err) => err.is_transient(),
            Self::Store(StoreError::Io(_)) => true,
            _ => false,
        }
    }

    /// Check if the error is an integrity failure
    #[inline]
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::CheckpointCorruption { .. } | Self::EventAppend(EventError::Integrity(_))
        ) || matches!(self, Self::Store(err) if err.is_integrity_failure())
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CheckpointCorruption { project, reason } => {
                Self::CheckpointCorruption { project, reason }
            }
            other => Self::Store(other),
        }
    }
}

impl From<BuildLoopError> for PipelineError {
    fn from(err: BuildLoopError) -> Self {
        match err {
            BuildLoopError::Event(err) => Self::EventAppend(err),
            BuildLoopError::Store(err) => err.into(),
            BuildLoopError::Transition(err) => Self::Transition(err),
            other => Self::Build(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vslice_model::ProjectId;

    #[test]
    fn corruption_is_not_retryable() {
        let project = ProjectId::new();
        let err: PipelineError = StoreError::CheckpointCorruption {
            project,
            reason: "duplicate step".into(),
        }
        .into();
        assert!(matches!(err, PipelineError::CheckpointCorruption { .. }));
        assert!(!err.is_retryable());
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn transient_append_is_retryable() {
        let err = PipelineError::from(EventError::Unavailable("db".into()));
        assert!(err.is_retryable());
        assert!(!PipelineError::from(EventError::Closed).is_retryable());
    }

    #[test]
    fn build_loop_errors_map_to_pipeline_errors() {
        let err = PipelineError::from(BuildLoopError::Event(EventError::Closed));
        assert!(matches!(err, PipelineError::EventAppend(EventError::Closed)));

        let err = PipelineError::from(BuildLoopError::AlreadyBuilding(SliceId::new()));
        assert!(matches!(err, PipelineError::Build(_)));
    }
}
