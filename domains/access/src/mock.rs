//! In-memory access stores for tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use opsdeck_common::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{
    Permission, ResourceKind, ResourceNode, ResourceScope, ResourceStatus,
};
use crate::domain::permission::PermissionType;
use crate::repository::{PermissionStore, ResourceRepository};
use crate::services::ResourceRegistry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPermissionStore {
    permissions: Arc<Mutex<Vec<Permission>>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a grant directly, bypassing authorization
    pub fn grant(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Permission {
        let permission =
            Permission::new(principal_id, permission_type, resource_id, None, Utc::now())
                .expect("seeded grant must have a valid shape");
        lock(&self.permissions).push(permission.clone());
        permission
    }

    pub fn last_accessed(&self, id: Uuid) -> Option<DateTime<Utc>> {
        lock(&self.permissions)
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.last_accessed_at)
    }

    pub fn len(&self) -> usize {
        lock(&self.permissions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn find_matching(
        &self,
        principal_id: Uuid,
        types: &[PermissionType],
        scope: &ResourceScope,
    ) -> Result<Option<Permission>, RepositoryError> {
        Ok(lock(&self.permissions)
            .iter()
            .find(|p| {
                p.principal_id == principal_id
                    && types.contains(&p.permission_type)
                    && p.matches_scope(scope)
            })
            .cloned())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(permission) = lock(&self.permissions).iter_mut().find(|p| p.id == id) {
            permission.last_accessed_at = Some(at);
        }
        Ok(())
    }

    async fn create(&self, permission: &Permission) -> Result<(), RepositoryError> {
        let mut permissions = lock(&self.permissions);
        let duplicate = permissions.iter().any(|p| {
            p.principal_id == permission.principal_id
                && p.permission_type == permission.permission_type
                && p.resource_id() == permission.resource_id()
        });
        if duplicate {
            return Err(RepositoryError::AlreadyExists);
        }
        permissions.push(permission.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Permission>, RepositoryError> {
        Ok(lock(&self.permissions).iter().find(|p| p.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut permissions = lock(&self.permissions);
        let before = permissions.len();
        permissions.retain(|p| p.id != id);
        Ok(permissions.len() < before)
    }

    async fn list_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<Permission>, RepositoryError> {
        Ok(lock(&self.permissions)
            .iter()
            .filter(|p| p.principal_id == principal_id)
            .cloned()
            .collect())
    }
}

/// All three resource tables in one map
#[derive(Debug, Clone, Default)]
pub struct InMemoryResources {
    nodes: Arc<Mutex<HashMap<Uuid, ResourceNode>>>,
}

/// One kind's view over [`InMemoryResources`]
#[derive(Debug, Clone)]
struct KindView {
    nodes: Arc<Mutex<HashMap<Uuid, ResourceNode>>>,
    kind: ResourceKind,
}

#[async_trait::async_trait]
impl ResourceRepository for KindView {
    async fn find(&self, id: Uuid) -> Result<Option<ResourceNode>, RepositoryError> {
        Ok(lock(&self.nodes)
            .get(&id)
            .filter(|n| n.kind == self.kind)
            .copied())
    }
}

impl InMemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, kind: ResourceKind, parent_id: Option<Uuid>, status: ResourceStatus) -> Uuid {
        let node = ResourceNode {
            kind,
            id: Uuid::new_v4(),
            parent_id,
            status,
        };
        lock(&self.nodes).insert(node.id, node);
        node.id
    }

    pub fn add_workspace(&self, status: ResourceStatus) -> Uuid {
        self.add(ResourceKind::Workspace, None, status)
    }

    pub fn add_client(&self, workspace_id: Uuid, status: ResourceStatus) -> Uuid {
        self.add(ResourceKind::Client, Some(workspace_id), status)
    }

    pub fn add_location(&self, client_id: Uuid, status: ResourceStatus) -> Uuid {
        self.add(ResourceKind::Location, Some(client_id), status)
    }

    pub fn set_status(&self, id: Uuid, status: ResourceStatus) {
        if let Some(node) = lock(&self.nodes).get_mut(&id) {
            node.status = status;
        }
    }

    /// Registry reading from this map
    pub fn registry(&self) -> ResourceRegistry {
        let view = |kind| -> Arc<dyn ResourceRepository> {
            Arc::new(KindView {
                nodes: Arc::clone(&self.nodes),
                kind,
            })
        };
        ResourceRegistry::new(
            view(ResourceKind::Workspace),
            view(ResourceKind::Client),
            view(ResourceKind::Location),
        )
    }
}
