//! Resource registry
//!
//! Maps each resource kind to its repository and resolves a resource's
//! lineage up to its workspace.

use std::sync::Arc;

use opsdeck_common::{RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{ResourceKind, ResourceLineage};
use crate::repository::{PgResourceRepository, ResourceRepository};

#[derive(Clone)]
pub struct ResourceRegistry {
    workspaces: Arc<dyn ResourceRepository>,
    clients: Arc<dyn ResourceRepository>,
    locations: Arc<dyn ResourceRepository>,
}

impl ResourceRegistry {
    pub fn new(
        workspaces: Arc<dyn ResourceRepository>,
        clients: Arc<dyn ResourceRepository>,
        locations: Arc<dyn ResourceRepository>,
    ) -> Self {
        Self {
            workspaces,
            clients,
            locations,
        }
    }

    /// Registry over the `workspaces`, `clients` and `locations` tables
    pub fn postgres(pool: PgPool, retry: RetryPolicy) -> Self {
        Self::new(
            Arc::new(PgResourceRepository::new(
                pool.clone(),
                retry,
                ResourceKind::Workspace,
            )),
            Arc::new(PgResourceRepository::new(
                pool.clone(),
                retry,
                ResourceKind::Client,
            )),
            Arc::new(PgResourceRepository::new(pool, retry, ResourceKind::Location)),
        )
    }

    pub fn repository(&self, kind: ResourceKind) -> &Arc<dyn ResourceRepository> {
        match kind {
            ResourceKind::Workspace => &self.workspaces,
            ResourceKind::Client => &self.clients,
            ResourceKind::Location => &self.locations,
        }
    }

    /// `id` interpreted as a `kind`, followed by its ancestors.
    ///
    /// `None` when `id` is unknown. A missing ancestor is reported as
    /// [`RepositoryError::InvalidData`].
    pub async fn lineage(
        &self,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<Option<ResourceLineage>, RepositoryError> {
        let Some(target) = self.repository(kind).find(id).await? else {
            return Ok(None);
        };

        let mut nodes = vec![target];
        let mut current = target;
        while let Some(parent_kind) = current.kind.parent() {
            let parent_id = current.parent_id.ok_or_else(|| {
                RepositoryError::InvalidData(format!("{} {} has no parent", current.kind, current.id))
            })?;
            let parent = self
                .repository(parent_kind)
                .find(parent_id)
                .await?
                .ok_or_else(|| {
                    RepositoryError::InvalidData(format!(
                        "{} {} references missing {} {}",
                        current.kind, current.id, parent_kind, parent_id
                    ))
                })?;
            nodes.push(parent);
            current = parent;
        }

        Ok(Some(ResourceLineage::new(nodes)))
    }
}
