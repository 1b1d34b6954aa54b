//! Principal repository

use chrono::{DateTime, Utc};
use opsdeck_common::{with_retry, with_retry_non_idempotent, RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use super::PrincipalStore;
use crate::domain::entities::{FailureRecord, Principal};

#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait::async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn get(&self, id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        with_retry(&self.retry, "principal_get", || async move {
            sqlx::query_as::<_, Principal>(
                r#"
                SELECT id, email, status, failed_attempts, lockout_until,
                       created_at, updated_at
                FROM principals
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    async fn record_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_attempts: i32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<FailureRecord>, RepositoryError> {
        with_retry_non_idempotent(&self.retry, "principal_record_failure", || async move {
            sqlx::query_as::<_, FailureRecord>(
                r#"
                UPDATE principals SET
                    failed_attempts = failed_attempts + 1,
                    lockout_until = CASE
                        WHEN failed_attempts + 1 >= $3 THEN $4
                        ELSE NULL
                    END,
                    status = CASE
                        WHEN failed_attempts + 1 >= $3 THEN 'locked'::principal_status
                        ELSE status
                    END,
                    updated_at = $2
                WHERE id = $1
                  AND status <> 'disabled'
                  AND (lockout_until IS NULL OR lockout_until <= $2)
                RETURNING failed_attempts, lockout_until
                "#,
            )
            .bind(id)
            .bind(now)
            .bind(max_attempts)
            .bind(lockout_until)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "principal_record_success", || async move {
            sqlx::query(
                r#"
                UPDATE principals SET
                    failed_attempts = 0,
                    lockout_until = NULL,
                    status = 'active',
                    updated_at = $2
                WHERE id = $1 AND status <> 'disabled'
                "#,
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn clear_lapsed_lockout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = with_retry(&self.retry, "principal_clear_lockout", || async move {
            sqlx::query(
                r#"
                UPDATE principals SET
                    failed_attempts = 0,
                    lockout_until = NULL,
                    status = 'active',
                    updated_at = $2
                WHERE id = $1
                  AND status <> 'disabled'
                  AND lockout_until IS NOT NULL
                  AND lockout_until <= $2
                "#,
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
