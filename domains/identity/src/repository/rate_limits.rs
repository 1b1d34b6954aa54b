//! Store-backed rate limiter for multi-instance deployments
//!
//! Windowing matches the in-memory limiter but the increment-and-expire is a
//! single upsert, so concurrent instances share one counter per identifier.

use opsdeck_common::{with_retry, with_retry_non_idempotent, RetryPolicy, SharedClock};
use sqlx::PgPool;

use crate::services::rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};

/// Increment-or-reset upsert. The counter saturates at `i32::MAX` so a
/// hammered identifier never overflows the INTEGER column.
const CHECK_SQL: &str = r#"
    INSERT INTO rate_limits (scope, identifier, attempt_count, last_attempt_at)
    VALUES ($1, $2, 1, $3)
    ON CONFLICT (scope, identifier) DO UPDATE SET
        attempt_count = CASE
            WHEN $3 - rate_limits.last_attempt_at > make_interval(secs => $4)
                THEN 1
            ELSE LEAST(rate_limits.attempt_count + 1, 2147483647)
        END,
        last_attempt_at = $3
    RETURNING attempt_count
"#;

#[derive(Clone)]
pub struct PgRateLimiter {
    pool: PgPool,
    retry: RetryPolicy,
    scope: &'static str,
    config: RateLimitConfig,
    clock: SharedClock,
}

impl PgRateLimiter {
    pub fn new(
        pool: PgPool,
        retry: RetryPolicy,
        scope: &'static str,
        config: RateLimitConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            pool,
            retry,
            scope,
            config,
            clock,
        }
    }

    fn window_seconds(&self) -> f64 {
        self.config.window.num_milliseconds() as f64 / 1000.0
    }
}

#[async_trait::async_trait]
impl RateLimiter for PgRateLimiter {
    async fn check(&self, identifier: &str) -> Result<(), RateLimitError> {
        let now = self.clock.now();
        let window_seconds = self.window_seconds();

        let attempts: i32 =
            with_retry_non_idempotent(&self.retry, "rate_limit_check", || async move {
                sqlx::query_scalar(CHECK_SQL)
                    .bind(self.scope)
                    .bind(identifier)
                    .bind(now)
                    .bind(window_seconds)
                    .fetch_one(&self.pool)
                    .await
            })
            .await?;

        if attempts as i64 > self.config.max_attempts as i64 {
            return Err(RateLimitError::Exceeded {
                retry_after: self.config.window,
            });
        }
        Ok(())
    }

    async fn sweep(&self) -> Result<u64, RateLimitError> {
        let cutoff = self.clock.now() - self.config.window;
        let result = with_retry(&self.retry, "rate_limit_sweep", || async move {
            sqlx::query("DELETE FROM rate_limits WHERE scope = $1 AND last_attempt_at < $2")
                .bind(self.scope)
                .bind(cutoff)
                .execute(&self.pool)
                .await
        })
        .await?;
        Ok(result.rows_affected())
    }
}
