//! Error types for stores

use std::path::PathBuf;
use vslice_model::{ProjectId, SliceId};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No project with this id
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No slice with this id
    #[error("slice not found: {0}")]
    SliceNotFound(SliceId),

    /// Project already exists
    #[error("project already exists: {0}")]
    ProjectExists(ProjectId),

    /// Completed-step bookkeeping cannot be trusted
    #[error("checkpoint for project {project} is corrupt: {reason}")]
    CheckpointCorruption {
        /// Affected project
        project: ProjectId,
        /// What is wrong
        reason: String,
    },

    /// Stored document is unreadable
    #[error("corrupt document {path}: {reason}")]
    Corrupt {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// IO failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the stored state itself is untrustworthy
    #[inline]
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::CheckpointCorruption { .. } | Self::Corrupt { .. })
    }
}
