//! JSON file stores
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<project-id>/project.json
//! <root>/<project-id>/slices.json
//! <root>/<project-id>/checkpoint.json
//! ```
//!
//! Writes go to a temp file that is renamed over the target, so a crash
//! leaves either the old or the new document. Writers are serialised per
//! project; read-modify-write of the checkpoint happens under that lock.

use crate::checkpoint::CheckpointStore;
use crate::error::StoreError;
use crate::project::ProjectStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use vslice_model::{Checkpoint, Project, ProjectId, Slice};

const CHECKPOINT_FILE: &str = "checkpoint.json";
const PROJECT_FILE: &str = "project.json";
const SLICES_FILE: &str = "slices.json";

#[derive(Debug, Default)]
struct ProjectLocks {
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    fn for_project(&self, project: ProjectId) -> Arc<Mutex<()>> {
        self.locks.entry(project).or_default().clone()
    }
}

fn project_dir(root: &Path, project: ProjectId) -> PathBuf {
    root.join(project.to_string())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(format!("json.{}.tmp", ulid::Ulid::new()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// `Ok(None)` when the file does not exist
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let Some(bytes) = read_bytes(path).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Checkpoints persisted as JSON files
#[derive(Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
    locks: ProjectLocks,
}

impl FileCheckpointStore {
    /// Store rooted at `root` (created on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: ProjectLocks::default(),
        }
    }

    fn path(&self, project: ProjectId) -> PathBuf {
        project_dir(&self.root, project).join(CHECKPOINT_FILE)
    }

    async fn read(&self, project: ProjectId) -> Result<Checkpoint, StoreError> {
        let Some(bytes) = read_bytes(&self.path(project)).await? else {
            return Ok(Checkpoint::new());
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            tracing::error!(%project, error = %err, "checkpoint failed to load");
            StoreError::CheckpointCorruption {
                project,
                reason: err.to_string(),
            }
        })
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, project: ProjectId) -> Result<Checkpoint, StoreError> {
        self.read(project).await
    }

    async fn mark_stage_complete(
        &self,
        project: ProjectId,
        step: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let mut checkpoint = self.read(project).await?;
        checkpoint.record(step, result);
        write_json(&self.path(project), &checkpoint).await?;
        tracing::debug!(%project, step, "checkpoint persisted");
        Ok(())
    }
}

/// Projects and slices persisted as JSON files
#[derive(Debug)]
pub struct FileProjectStore {
    root: PathBuf,
    locks: ProjectLocks,
}

impl FileProjectStore {
    /// Store rooted at `root` (created on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: ProjectLocks::default(),
        }
    }

    fn project_path(&self, project: ProjectId) -> PathBuf {
        project_dir(&self.root, project).join(PROJECT_FILE)
    }

    fn slices_path(&self, project: ProjectId) -> PathBuf {
        project_dir(&self.root, project).join(SLICES_FILE)
    }

    /// Ids of every stored project
    ///
    /// # Errors
    /// IO failures reading the root directory.
    pub async fn list(&self) -> Result<Vec<ProjectId>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ProjectId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn create(&self, project: Project) -> Result<(), StoreError> {
        let lock = self.locks.for_project(project.id);
        let _guard = lock.lock().await;

        let path = self.project_path(project.id);
        if read_bytes(&path).await?.is_some() {
            return Err(StoreError::ProjectExists(project.id));
        }
        write_json(&path, &project).await
    }

    async fn get(&self, id: ProjectId) -> Result<Project, StoreError> {
        read_json(&self.project_path(id))
            .await?
            .ok_or(StoreError::ProjectNotFound(id))
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let lock = self.locks.for_project(project.id);
        let _guard = lock.lock().await;

        let path = self.project_path(project.id);
        if read_bytes(&path).await?.is_none() {
            return Err(StoreError::ProjectNotFound(project.id));
        }
        write_json(&path, project).await
    }

    async fn save_slices(&self, project: ProjectId, slices: &[Slice]) -> Result<(), StoreError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        if read_bytes(&self.project_path(project)).await?.is_none() {
            return Err(StoreError::ProjectNotFound(project));
        }
        write_json(&self.slices_path(project), slices).await
    }

    async fn slices(&self, project: ProjectId) -> Result<Vec<Slice>, StoreError> {
        Ok(read_json(&self.slices_path(project)).await?.unwrap_or_default())
    }

    async fn update_slice(&self, slice: &Slice) -> Result<(), StoreError> {
        let lock = self.locks.for_project(slice.project_id);
        let _guard = lock.lock().await;

        let path = self.slices_path(slice.project_id);
        let mut slices: Vec<Slice> = read_json(&path).await?.unwrap_or_default();
        let stored = slices
            .iter_mut()
            .find(|s| s.id == slice.id)
            .ok_or(StoreError::SliceNotFound(slice.id))?;
        *stored = slice.clone();
        write_json(&path, &slices).await
    }
}
