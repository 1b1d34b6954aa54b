//! Workspace, client and location lookups

use opsdeck_common::{with_retry, RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use super::ResourceRepository;
use crate::domain::entities::{ResourceKind, ResourceNode, ResourceStatus};

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    status: ResourceStatus,
}

/// One repository per resource table
#[derive(Clone)]
pub struct PgResourceRepository {
    pool: PgPool,
    retry: RetryPolicy,
    kind: ResourceKind,
}

impl PgResourceRepository {
    pub fn new(pool: PgPool, retry: RetryPolicy, kind: ResourceKind) -> Self {
        Self { pool, retry, kind }
    }

    fn query(&self) -> &'static str {
        match self.kind {
            ResourceKind::Workspace => {
                "SELECT id, NULL::uuid AS parent_id, status FROM workspaces WHERE id = $1"
            }
            ResourceKind::Client => {
                "SELECT id, workspace_id AS parent_id, status FROM clients WHERE id = $1"
            }
            ResourceKind::Location => {
                "SELECT id, client_id AS parent_id, status FROM locations WHERE id = $1"
            }
        }
    }
}

#[async_trait::async_trait]
impl ResourceRepository for PgResourceRepository {
    async fn find(&self, id: Uuid) -> Result<Option<ResourceNode>, RepositoryError> {
        let sql = self.query();
        let row = with_retry(&self.retry, "resource_find", || async move {
            sqlx::query_as::<_, ResourceRow>(sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;

        Ok(row.map(|row| ResourceNode {
            kind: self.kind,
            id: row.id,
            parent_id: row.parent_id,
            status: row.status,
        }))
    }
}
