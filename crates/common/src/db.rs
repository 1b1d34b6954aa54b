//! Shared data-access types for OpsDeck
//!
//! Every repository funnels its queries through [`with_retry`], which applies a
//! per-query deadline and retries connection-level failures with bounded
//! exponential backoff. Constraint violations and missing rows are returned
//! immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::env_or;

/// Postgres SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// Database-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    AlreadyExists,

    #[error("Database connection error: {0}")]
    Connection(sqlx::Error),

    #[error("Store query exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("Database query error: {0}")]
    Query(sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl RepositoryError {
    /// Whether the failure is transient infrastructure trouble worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err),
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Self::AlreadyExists
            }
            other => Self::Query(other),
        }
    }
}

/// Retry and deadline settings for store access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub base_delay: Duration,
    /// Deadline applied to every individual query
    pub query_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            query_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Load the policy from `STORE_RETRY_*` / `STORE_QUERY_TIMEOUT_MS`
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: env_or("STORE_RETRY_ATTEMPTS", defaults.max_attempts)?.max(1),
            base_delay: Duration::from_millis(env_or(
                "STORE_RETRY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            query_timeout: Duration::from_millis(env_or(
                "STORE_QUERY_TIMEOUT_MS",
                defaults.query_timeout.as_millis() as u64,
            )?),
        })
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Run a store operation under the retry policy.
///
/// `operation` is invoked once per attempt and must build a fresh query each
/// time. Only [`RepositoryError::is_retryable`] failures are retried.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    operation: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    retry_loop(policy, operation_name, Idempotency::Idempotent, operation).await
}

/// Run a write that must not be applied twice.
///
/// A statement that missed its deadline may still commit on the server, so a
/// [`RepositoryError::Timeout`] is returned to the caller instead of retried.
/// Connection failures are still retried.
pub async fn with_retry_non_idempotent<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    operation: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    retry_loop(policy, operation_name, Idempotency::NonIdempotent, operation).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idempotency {
    Idempotent,
    NonIdempotent,
}

impl Idempotency {
    fn may_retry(self, err: &RepositoryError) -> bool {
        match (self, err) {
            (Self::NonIdempotent, RepositoryError::Timeout(_)) => false,
            _ => err.is_retryable(),
        }
    }
}

async fn retry_loop<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    idempotency: Idempotency,
    mut operation: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.query_timeout, operation()).await {
            Ok(result) => result.map_err(RepositoryError::from),
            Err(_) => Err(RepositoryError::Timeout(policy.query_timeout)),
        };

        match outcome {
            Err(err) if idempotency.may_retry(&err) && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying store operation"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "Store operation failed after retries"
                    );
                }
                return Err(err);
            }
            ok => return ok,
        }
    }
}
