//! Verification token repository

use chrono::{DateTime, Utc};
use opsdeck_common::{with_retry, with_retry_non_idempotent, RepositoryError, RetryPolicy};
use sqlx::PgPool;

use super::TokenStore;
use crate::domain::entities::{VerificationPurpose, VerificationToken};

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgTokenStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait::async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &VerificationToken) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "token_insert", || async move {
            sqlx::query(
                r#"
                INSERT INTO verification_tokens (identifier, code, purpose, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&token.identifier)
            .bind(&token.code)
            .bind(token.purpose)
            .bind(token.expires_at)
            .bind(token.created_at)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        with_retry_non_idempotent(&self.retry, "token_consume", || async move {
            sqlx::query_as::<_, VerificationToken>(
                r#"
                DELETE FROM verification_tokens
                WHERE identifier = $1 AND code = $2 AND purpose = $3 AND expires_at > $4
                RETURNING identifier, code, purpose, expires_at, created_at
                "#,
            )
            .bind(identifier)
            .bind(code)
            .bind(purpose)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    async fn find(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        with_retry(&self.retry, "token_find", || async move {
            sqlx::query_as::<_, VerificationToken>(
                r#"
                SELECT identifier, code, purpose, expires_at, created_at
                FROM verification_tokens
                WHERE identifier = $1 AND code = $2 AND purpose = $3
                "#,
            )
            .bind(identifier)
            .bind(code)
            .bind(purpose)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    async fn delete_for_purpose(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> Result<u64, RepositoryError> {
        let result = with_retry(&self.retry, "token_delete_for_purpose", || async move {
            sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1 AND purpose = $2")
                .bind(identifier)
                .bind(purpose)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_identifier(&self, identifier: &str) -> Result<u64, RepositoryError> {
        let result = with_retry(&self.retry, "token_delete_for_identifier", || async move {
            sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
                .bind(identifier)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = with_retry(&self.retry, "token_delete_expired", || async move {
            sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(result.rows_affected())
    }
}
