//! Store contracts and Postgres implementations for the access domain

pub mod permissions;
pub mod resources;

use chrono::{DateTime, Utc};
use opsdeck_common::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{Permission, ResourceNode, ResourceScope};
use crate::domain::permission::PermissionType;

pub use permissions::PgPermissionStore;
pub use resources::PgResourceRepository;

type StoreResult<T> = std::result::Result<T, RepositoryError>;

/// Permission record persistence
#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// First grant of `principal_id` with a type in `types` that applies to `scope`
    async fn find_matching(
        &self,
        principal_id: Uuid,
        types: &[PermissionType],
        scope: &ResourceScope,
    ) -> StoreResult<Option<Permission>>;

    /// Stamp `last_accessed_at`
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Insert a grant; a duplicate yields [`RepositoryError::AlreadyExists`]
    async fn create(&self, permission: &Permission) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Permission>>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_for_principal(&self, principal_id: Uuid) -> StoreResult<Vec<Permission>>;
}

/// Lookup of one resource kind
#[async_trait::async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> StoreResult<Option<ResourceNode>>;
}
