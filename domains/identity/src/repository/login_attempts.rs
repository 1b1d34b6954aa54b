//! Login attempt trail repository

use chrono::{DateTime, Utc};
use opsdeck_common::{with_retry, RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use super::LoginAttemptStore;
use crate::domain::entities::LoginAttempt;

#[derive(Clone)]
pub struct PgLoginAttemptStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgLoginAttemptStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait::async_trait]
impl LoginAttemptStore for PgLoginAttemptStore {
    async fn append(&self, attempt: &LoginAttempt) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "login_attempt_append", || async move {
            sqlx::query(
                r#"
                INSERT INTO login_attempts (id, principal_id, succeeded, method, failure_reason, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(attempt.id)
            .bind(attempt.principal_id)
            .bind(attempt.succeeded)
            .bind(attempt.method)
            .bind(attempt.failure_reason)
            .bind(attempt.created_at)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn count_failures_since(
        &self,
        principal_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        with_retry(&self.retry, "login_attempt_count_failures", || async move {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM login_attempts
                WHERE principal_id = $1 AND succeeded = FALSE AND created_at >= $2
                "#,
            )
            .bind(principal_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await
        })
        .await
    }
}
