//! OpsDeck Audit
//!
//! Append-only audit trail shared by the access and identity domains:
//! - [`AuditEvent`] model with event types and severities
//! - [`AuditSink`] trait with tracing and Postgres implementations
//! - [`AuditLog`], the best-effort wrapper every component writes through
//!
//! Sink failures never fail the caller's operation. They are logged and
//! swallowed by [`AuditLog::record`].

use std::sync::Arc;
use std::time::Duration;

use opsdeck_common::config::env_or;
use thiserror::Error;

pub mod event;
pub mod postgres;
pub mod sink;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use event::{AuditEvent, AuditEventType, Severity};
pub use postgres::PgAuditSink;
pub use sink::{AuditLog, TracingAuditSink};

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit configuration error: {0}")]
    Configuration(String),

    #[error("Audit store error: {0}")]
    Store(#[from] opsdeck_common::RepositoryError),

    #[error("Audit append timed out after {0:?}")]
    Timeout(Duration),
}

/// Destination for audit events
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event to the trail
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Which sink backs the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSinkKind {
    /// `audit_events` table
    Postgres,
    /// Structured log lines only
    Tracing,
}

impl std::str::FromStr for AuditSinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "tracing" | "log" => Ok(Self::Tracing),
            other => Err(format!(
                "Unknown audit sink: {}. Supported sinks: postgres, tracing",
                other
            )),
        }
    }
}

/// Audit configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    /// Upper bound on a single append before it is abandoned
    pub append_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Postgres,
            append_timeout: Duration::from_millis(250),
        }
    }
}

impl AuditConfig {
    /// Load from `AUDIT_SINK` / `AUDIT_APPEND_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, AuditError> {
        let defaults = Self::default();
        let sink = match std::env::var("AUDIT_SINK") {
            Ok(raw) => raw.parse().map_err(AuditError::Configuration)?,
            Err(_) => defaults.sink,
        };
        let append_timeout_ms = env_or(
            "AUDIT_APPEND_TIMEOUT_MS",
            defaults.append_timeout.as_millis() as u64,
        )
        .map_err(|e| AuditError::Configuration(e.to_string()))?;

        Ok(Self {
            sink,
            append_timeout: Duration::from_millis(append_timeout_ms),
        })
    }
}

/// Audit sink factory
pub struct AuditSinkFactory;

impl AuditSinkFactory {
    /// Build the configured sink
    pub fn create(
        config: &AuditConfig,
        pool: sqlx::PgPool,
        retry: opsdeck_common::RetryPolicy,
    ) -> Arc<dyn AuditSink> {
        match config.sink {
            AuditSinkKind::Postgres => {
                tracing::info!("Creating Postgres audit sink");
                Arc::new(PgAuditSink::new(pool, retry))
            }
            AuditSinkKind::Tracing => {
                tracing::info!("Creating tracing audit sink");
                Arc::new(TracingAuditSink)
            }
        }
    }
}
