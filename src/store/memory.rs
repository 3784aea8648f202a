use crate::core::{ArtifactPayload, ContainerPayload};
use crate::store::{ArtifactId, CaseStore, ContainerId, ExistingArtifact, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredContainer {
    pub id: ContainerId,
    pub payload: ContainerPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub id: ArtifactId,
    pub container_id: ContainerId,
    pub payload: ArtifactPayload,
}

/// In-process case store used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    containers: Vec<StoredContainer>,
    artifacts: Vec<StoredArtifact>,
    next_id: u64,
    container_updates: u64,
}

impl MemoryCaseStore {
    pub fn containers(&self) -> &[StoredContainer] {
        &self.containers
    }

    pub fn artifacts(&self) -> &[StoredArtifact] {
        &self.artifacts
    }

    pub fn artifacts_of(&self, container_id: ContainerId) -> Vec<&StoredArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.container_id == container_id)
            .collect()
    }

    pub fn container_updates(&self) -> u64 {
        self.container_updates
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_artifact(&mut self, container_id: ContainerId, payload: &ArtifactPayload) -> ArtifactId {
        let id = self.allocate_id();
        let mut payload = payload.clone();
        payload.id = Some(id);
        payload.container_id = Some(container_id);
        self.artifacts.push(StoredArtifact {
            id,
            container_id,
            payload,
        });
        id
    }
}

impl CaseStore for MemoryCaseStore {
    fn find_container(&self, identifier: &str) -> Result<Option<ContainerId>, StoreError> {
        Ok(self
            .containers
            .iter()
            .find(|c| c.payload.source_data_identifier == identifier)
            .map(|c| c.id))
    }

    fn create_container(&mut self, container: &ContainerPayload) -> Result<ContainerId, StoreError> {
        if self.find_container(&container.source_data_identifier)?.is_some() {
            return Err(StoreError::Rejected(format!(
                "duplicate source_data_identifier: {}",
                container.source_data_identifier
            )));
        }
        let id = self.allocate_id();
        let mut payload = container.clone();
        let artifacts = std::mem::take(&mut payload.artifacts);
        self.containers.push(StoredContainer { id, payload });
        for artifact in &artifacts {
            self.insert_artifact(id, artifact);
        }
        Ok(id)
    }

    fn update_container(
        &mut self,
        id: ContainerId,
        container: &ContainerPayload,
    ) -> Result<(), StoreError> {
        let Some(slot) = self.containers.iter_mut().find(|c| c.id == id) else {
            return Err(StoreError::Status {
                status: 404,
                body: format!("container {id} not found"),
            });
        };
        slot.payload = container.clone();
        self.container_updates += 1;
        Ok(())
    }

    fn find_artifact(
        &self,
        identifier: &str,
        container_id: ContainerId,
    ) -> Result<Option<ExistingArtifact>, StoreError> {
        Ok(self
            .artifacts
            .iter()
            .filter(|a| {
                a.container_id == container_id && a.payload.source_data_identifier == identifier
            })
            .max_by_key(|a| a.id)
            .map(|a| ExistingArtifact {
                id: a.id,
                container_id: a.container_id,
            }))
    }

    fn create_artifact(&mut self, artifact: &ArtifactPayload) -> Result<ArtifactId, StoreError> {
        let Some(container_id) = artifact.container_id else {
            return Err(StoreError::Rejected("artifact without container_id".to_string()));
        };
        if !self.containers.iter().any(|c| c.id == container_id) {
            return Err(StoreError::Status {
                status: 404,
                body: format!("container {container_id} not found"),
            });
        }
        Ok(self.insert_artifact(container_id, artifact))
    }

    fn update_artifact(&mut self, artifact: &ArtifactPayload) -> Result<(), StoreError> {
        let Some(id) = artifact.id else {
            return Err(StoreError::Rejected("artifact without id".to_string()));
        };
        let Some(slot) = self.artifacts.iter_mut().find(|a| a.id == id) else {
            return Err(StoreError::Status {
                status: 404,
                body: format!("artifact {id} not found"),
            });
        };
        let mut payload = artifact.clone();
        payload.container_id = Some(slot.container_id);
        slot.payload = payload;
        Ok(())
    }
}
