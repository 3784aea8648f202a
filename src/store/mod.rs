//! Case-management side of ingestion: containers and artifacts keyed by their
//! `source_data_identifier`.

mod memory;
mod soar;

pub use memory::{MemoryCaseStore, StoredArtifact, StoredContainer};
pub use soar::SoarStore;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{ArtifactPayload, ContainerPayload};

pub type ContainerId = u64;
pub type ArtifactId = u64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ケース管理システムへの接続に失敗しました: {0}")]
    Connection(String),

    #[error("ケース管理システムがエラーを返しました（status={status}）: {body}")]
    Status { status: u16, body: String },

    #[error("ケース管理システムの応答を解析できません: {0}")]
    Parse(String),

    #[error("ケース管理システムが要求を拒否しました: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingArtifact {
    pub id: ArtifactId,
    pub container_id: ContainerId,
}

pub trait CaseStore {
    fn find_container(&self, identifier: &str) -> Result<Option<ContainerId>, StoreError>;

    fn create_container(&mut self, container: &ContainerPayload) -> Result<ContainerId, StoreError>;

    /// The payload's artifact list is empty; artifacts are never replaced wholesale.
    fn update_container(
        &mut self,
        id: ContainerId,
        container: &ContainerPayload,
    ) -> Result<(), StoreError>;

    /// Newest artifact with this identifier inside the container.
    fn find_artifact(
        &self,
        identifier: &str,
        container_id: ContainerId,
    ) -> Result<Option<ExistingArtifact>, StoreError>;

    /// `artifact.container_id` is set.
    fn create_artifact(&mut self, artifact: &ArtifactPayload) -> Result<ArtifactId, StoreError>;

    /// `artifact.id` and `artifact.container_id` are set.
    fn update_artifact(&mut self, artifact: &ArtifactPayload) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub status: UpsertStatus,
    pub container_id: ContainerId,
    /// Artifacts attached to a newly created container.
    pub artifacts: u64,
    /// Artifacts written into an existing container.
    pub merged: u64,
}

pub struct DedupStore<S> {
    store: S,
}

impl<S: CaseStore> DedupStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// A failed lookup reads as "not found": a possible duplicate container is
    /// preferred over a dropped finding.
    pub fn find(&self, identifier: &str) -> Option<ContainerId> {
        match self.store.find_container(identifier) {
            Ok(found) => found,
            Err(err) => {
                warn!(identifier, error = %err, "container lookup failed; treating as not found");
                None
            }
        }
    }

    pub fn upsert(
        &mut self,
        container: ContainerPayload,
        artifacts: Vec<ArtifactPayload>,
    ) -> Result<UpsertOutcome, StoreError> {
        let existing = self.find(&container.source_data_identifier);
        self.upsert_found(existing, container, artifacts)
    }

    /// Upsert with the result of an earlier [`DedupStore::find`].
    pub fn upsert_found(
        &mut self,
        existing: Option<ContainerId>,
        mut container: ContainerPayload,
        artifacts: Vec<ArtifactPayload>,
    ) -> Result<UpsertOutcome, StoreError> {
        let Some(container_id) = existing else {
            container.artifacts = artifacts;
            let written = container.artifacts.len() as u64;
            let container_id = self.store.create_container(&container)?;
            debug!(
                container_id,
                identifier = %container.source_data_identifier,
                artifacts = written,
                "created container"
            );
            return Ok(UpsertOutcome {
                status: UpsertStatus::Created,
                container_id,
                artifacts: written,
                merged: 0,
            });
        };

        container.artifacts.clear();
        self.store.update_container(container_id, &container)?;
        debug!(
            container_id,
            identifier = %container.source_data_identifier,
            "updated container"
        );

        let mut written = 0;
        for artifact in artifacts {
            if self.merge_artifact(container_id, artifact) {
                written += 1;
            }
        }
        Ok(UpsertOutcome {
            status: UpsertStatus::Updated,
            container_id,
            artifacts: 0,
            merged: written,
        })
    }

    fn merge_artifact(&mut self, container_id: ContainerId, mut artifact: ArtifactPayload) -> bool {
        let existing = match self
            .store
            .find_artifact(&artifact.source_data_identifier, container_id)
        {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    identifier = %artifact.source_data_identifier,
                    container_id,
                    error = %err,
                    "artifact lookup failed; treating as not found"
                );
                None
            }
        };

        let result = match existing {
            Some(found) => {
                artifact.id = Some(found.id);
                artifact.container_id = Some(found.container_id);
                self.store.update_artifact(&artifact)
            }
            None => {
                artifact.container_id = Some(container_id);
                self.store.create_artifact(&artifact).map(|_| ())
            }
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    identifier = %artifact.source_data_identifier,
                    container_id,
                    error = %err,
                    "failed to save artifact"
                );
                false
            }
        }
    }
}
