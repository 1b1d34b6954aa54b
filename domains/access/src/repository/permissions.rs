//! Permission record repository

use chrono::{DateTime, Utc};
use opsdeck_common::{with_retry, RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use super::PermissionStore;
use crate::domain::entities::{Permission, ResourceKind, ResourceScope};
use crate::domain::permission::PermissionType;

const PERMISSION_COLUMNS: &str = "id, principal_id, permission_type, workspace_id, client_id, \
                                  location_id, last_accessed_at, created_at, granted_by";

#[derive(Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait::async_trait]
impl PermissionStore for PgPermissionStore {
    async fn find_matching(
        &self,
        principal_id: Uuid,
        types: &[PermissionType],
        scope: &ResourceScope,
    ) -> Result<Option<Permission>, RepositoryError> {
        let type_names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        let type_names = &type_names;

        match scope {
            ResourceScope::Platform => {
                let sql = format!(
                    r#"
                    SELECT {PERMISSION_COLUMNS}
                    FROM permissions
                    WHERE principal_id = $1
                      AND permission_type::text = ANY($2)
                      AND workspace_id IS NULL AND client_id IS NULL AND location_id IS NULL
                    ORDER BY created_at
                    LIMIT 1
                    "#
                );
                let sql = &sql;
                with_retry(&self.retry, "permission_find_platform", || async move {
                    sqlx::query_as::<_, Permission>(sql)
                        .bind(principal_id)
                        .bind(type_names)
                        .fetch_optional(&self.pool)
                        .await
                })
                .await
            }
            ResourceScope::Lineage(lineage) => {
                // The permissions CHECK constraint ties each column to its tier,
                // so matching on the column is matching at the grant's tier.
                let workspace_id = lineage.id_for(ResourceKind::Workspace);
                let client_id = lineage.id_for(ResourceKind::Client);
                let location_id = lineage.id_for(ResourceKind::Location);
                let sql = format!(
                    r#"
                    SELECT {PERMISSION_COLUMNS}
                    FROM permissions
                    WHERE principal_id = $1
                      AND permission_type::text = ANY($2)
                      AND (workspace_id = $3 OR client_id = $4 OR location_id = $5)
                    ORDER BY created_at
                    LIMIT 1
                    "#
                );
                let sql = &sql;
                with_retry(&self.retry, "permission_find_lineage", || async move {
                    sqlx::query_as::<_, Permission>(sql)
                        .bind(principal_id)
                        .bind(type_names)
                        .bind(workspace_id)
                        .bind(client_id)
                        .bind(location_id)
                        .fetch_optional(&self.pool)
                        .await
                })
                .await
            }
        }
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "permission_touch", || async move {
            sqlx::query("UPDATE permissions SET last_accessed_at = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(())
    }

    async fn create(&self, permission: &Permission) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "permission_create", || async move {
            sqlx::query(
                r#"
                INSERT INTO permissions (id, principal_id, permission_type, workspace_id,
                                         client_id, location_id, last_accessed_at,
                                         created_at, granted_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(permission.id)
            .bind(permission.principal_id)
            .bind(permission.permission_type)
            .bind(permission.workspace_id)
            .bind(permission.client_id)
            .bind(permission.location_id)
            .bind(permission.last_accessed_at)
            .bind(permission.created_at)
            .bind(permission.granted_by)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Permission>, RepositoryError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1");
        let sql = &sql;
        with_retry(&self.retry, "permission_get", || async move {
            sqlx::query_as::<_, Permission>(sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = with_retry(&self.retry, "permission_delete", || async move {
            sqlx::query("DELETE FROM permissions WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_principal(&self, principal_id: Uuid) -> Result<Vec<Permission>, RepositoryError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE principal_id = $1 ORDER BY created_at"
        );
        let sql = &sql;
        with_retry(&self.retry, "permission_list", || async move {
            sqlx::query_as::<_, Permission>(sql)
                .bind(principal_id)
                .fetch_all(&self.pool)
                .await
        })
        .await
    }
}
