//! Checkpoint store contract and in-memory implementation

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use vslice_model::{Checkpoint, ProjectId};

/// Durable record of completed pipeline steps
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Checkpoint for `project`; empty if none was written yet
    ///
    /// # Errors
    /// [`StoreError::CheckpointCorruption`] if the stored record breaks the
    /// step/result invariant or cannot be parsed.
    async fn load(&self, project: ProjectId) -> Result<Checkpoint, StoreError>;

    /// Record `step` as complete with `result`
    ///
    /// Idempotent: repeating a step replaces its result without
    /// duplicating the name. Only the slot for `step` is written.
    async fn mark_stage_complete(
        &self,
        project: ProjectId,
        step: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Whether `step` is complete for `project`
    async fn is_stage_complete(&self, project: ProjectId, step: &str) -> Result<bool, StoreError> {
        Ok(self.load(project).await?.is_complete(step))
    }
}

/// Checkpoints held in memory
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: DashMap<ProjectId, Checkpoint>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a checkpoint wholesale (seeding tests and imports)
    ///
    /// # Errors
    /// Rejects a checkpoint that breaks the step/result invariant.
    pub fn insert(&self, project: ProjectId, checkpoint: Checkpoint) -> Result<(), StoreError> {
        checkpoint
            .validate()
            .map_err(|violation| StoreError::CheckpointCorruption {
                project,
                reason: violation.to_string(),
            })?;
        self.checkpoints.insert(project, checkpoint);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, project: ProjectId) -> Result<Checkpoint, StoreError> {
        Ok(self
            .checkpoints
            .get(&project)
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    async fn mark_stage_complete(
        &self,
        project: ProjectId,
        step: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        // The entry guard serialises writers per project; each writer only
        // touches its own step.
        let added = self
            .checkpoints
            .entry(project)
            .or_default()
            .record(step, result);
        tracing::debug!(%project, step, added, "checkpoint step recorded");
        Ok(())
    }

    async fn is_stage_complete(&self, project: ProjectId, step: &str) -> Result<bool, StoreError> {
        Ok(self
            .checkpoints
            .get(&project)
            .is_some_and(|c| c.is_complete(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn load_unknown_project_is_empty() {
        let store = MemoryCheckpointStore::new();
        let cp = store.load(ProjectId::new()).await.unwrap();
        assert!(cp.is_empty());
    }

    #[tokio::test]
    async fn mark_is_idempotent() {
        let store = MemoryCheckpointStore::new();
        let project = ProjectId::new();

        store
            .mark_stage_complete(project, "code_analysis", json!(1))
            .await
            .unwrap();
        store
            .mark_stage_complete(project, "code_analysis", json!(2))
            .await
            .unwrap();

        let cp = store.load(project).await.unwrap();
        assert_eq!(cp.len(), 1);
        assert_eq!(cp.result("code_analysis"), Some(&json!(2)));
        assert!(store.is_stage_complete(project, "code_analysis").await.unwrap());
        assert!(!store.is_stage_complete(project, "planning").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_writers_keep_every_slot() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let project = ProjectId::new();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .mark_stage_complete(project, &format!("stage-{i}"), json!(i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let cp = store.load(project).await.unwrap();
        assert_eq!(cp.len(), 16);
        for i in 0..16 {
            assert_eq!(cp.result(&format!("stage-{i}")), Some(&json!(i)));
        }
    }

    #[test]
    fn insert_validates() {
        let store = MemoryCheckpointStore::new();
        let mut cp = Checkpoint::new();
        cp.record("a", json!(null));
        assert!(store.insert(ProjectId::new(), cp).is_ok());
    }
}
