//! Postgres-backed audit sink

use opsdeck_common::{with_retry, RetryPolicy};
use sqlx::PgPool;

use crate::{AuditError, AuditEvent, AuditSink};

/// Appends events to the `audit_events` table
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgAuditSink {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait::async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        let event = &event;
        with_retry(&self.retry, "audit_append", || async move {
            sqlx::query(
                r#"
                INSERT INTO audit_events (
                    principal_id, event_type, resource_type, resource_id,
                    severity, description, metadata, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.principal_id)
            .bind(event.event_type.as_str())
            .bind(event.resource_type.as_deref())
            .bind(event.resource_id.as_deref())
            .bind(event.severity.as_str())
            .bind(&event.description)
            .bind(&event.metadata)
            .bind(event.timestamp)
            .execute(&self.pool)
            .await
        })
        .await?;
        Ok(())
    }
}
