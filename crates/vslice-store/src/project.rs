//! Project store contract and in-memory implementation

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use vslice_model::{Project, ProjectId, Slice};

/// Projects and their planned slices
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Store a new project
    async fn create(&self, project: Project) -> Result<(), StoreError>;

    /// Fetch a project
    async fn get(&self, id: ProjectId) -> Result<Project, StoreError>;

    /// Overwrite a stored project
    async fn save(&self, project: &Project) -> Result<(), StoreError>;

    /// Replace the slice list of a project (plan order is kept)
    async fn save_slices(&self, project: ProjectId, slices: &[Slice]) -> Result<(), StoreError>;

    /// Slices of a project in plan order
    async fn slices(&self, project: ProjectId) -> Result<Vec<Slice>, StoreError>;

    /// Overwrite one slice in place
    async fn update_slice(&self, slice: &Slice) -> Result<(), StoreError>;
}

/// Projects held in memory
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: DashMap<ProjectId, Project>,
    slices: DashMap<ProjectId, Vec<Slice>>,
}

impl MemoryProjectStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create(&self, project: Project) -> Result<(), StoreError> {
        match self.projects.entry(project.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::ProjectExists(project.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(project);
                Ok(())
            }
        }
    }

    async fn get(&self, id: ProjectId) -> Result<Project, StoreError> {
        self.projects
            .get(&id)
            .map(|p| p.clone())
            .ok_or(StoreError::ProjectNotFound(id))
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let mut stored = self
            .projects
            .get_mut(&project.id)
            .ok_or(StoreError::ProjectNotFound(project.id))?;
        *stored = project.clone();
        Ok(())
    }

    async fn save_slices(&self, project: ProjectId, slices: &[Slice]) -> Result<(), StoreError> {
        if !self.projects.contains_key(&project) {
            return Err(StoreError::ProjectNotFound(project));
        }
        self.slices.insert(project, slices.to_vec());
        Ok(())
    }

    async fn slices(&self, project: ProjectId) -> Result<Vec<Slice>, StoreError> {
        Ok(self
            .slices
            .get(&project)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn update_slice(&self, slice: &Slice) -> Result<(), StoreError> {
        let mut slices = self
            .slices
            .get_mut(&slice.project_id)
            .ok_or(StoreError::SliceNotFound(slice.id))?;
        let stored = slices
            .iter_mut()
            .find(|s| s.id == slice.id)
            .ok_or(StoreError::SliceNotFound(slice.id))?;
        *stored = slice.clone();
        Ok(())
    }
}
