//! Per-identifier attempt limiting
//!
//! An entry counts attempts since its last attempt; once more than `window`
//! has passed since that last attempt the count restarts. Every call is
//! recorded, including the ones that are rejected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use opsdeck_common::{RepositoryError, RetryPolicy, SharedClock};
use sqlx::PgPool;

use crate::repository::PgRateLimiter;

/// Limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window: Duration::seconds(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry after {retry_after}")]
    Exceeded { retry_after: Duration },

    #[error("Rate limit store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Attempt limiter keyed by identifier
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `identifier`, failing once the window's budget is spent
    async fn check(&self, identifier: &str) -> Result<(), RateLimitError>;

    /// Drop entries idle for longer than the window; returns how many went
    async fn sweep(&self) -> Result<u64, RateLimitError>;
}

/// Where limiter state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitBackend {
    /// Process-local map; not shared between instances
    #[default]
    Memory,
    /// `rate_limits` table; shared by every instance on the database
    Postgres,
}

impl std::str::FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "pg" => Ok(Self::Postgres),
            other => Err(format!(
                "unknown rate limit backend '{}'; expected memory or postgres",
                other
            )),
        }
    }
}

/// Transient limiter entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub attempt_count: u32,
    pub last_attempt_at: DateTime<Utc>,
}

/// Mutex-guarded in-process limiter
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current entry for `identifier`, if any
    pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries().get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, identifier: &str) -> Result<(), RateLimitError> {
        let now = self.clock.now();
        let count = {
            let mut entries = self.entries();
            let entry = entries
                .entry(identifier.to_string())
                .or_insert(RateLimitEntry {
                    attempt_count: 0,
                    last_attempt_at: now,
                });
            if now - entry.last_attempt_at > self.config.window {
                entry.attempt_count = 0;
            }
            entry.attempt_count = entry.attempt_count.saturating_add(1);
            entry.last_attempt_at = now;
            entry.attempt_count
        };

        if count > self.config.max_attempts {
            return Err(RateLimitError::Exceeded {
                retry_after: self.config.window,
            });
        }
        Ok(())
    }

    async fn sweep(&self) -> Result<u64, RateLimitError> {
        let now = self.clock.now();
        let window = self.config.window;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.last_attempt_at <= window);
        Ok((before - entries.len()) as u64)
    }
}

/// Builds limiters for the configured backend
pub struct RateLimiterFactory;

impl RateLimiterFactory {
    /// `scope` keeps separate limiters apart in the shared table
    pub fn create(
        backend: RateLimitBackend,
        scope: &'static str,
        config: RateLimitConfig,
        clock: SharedClock,
        pool: &PgPool,
        retry: RetryPolicy,
    ) -> Arc<dyn RateLimiter> {
        match backend {
            RateLimitBackend::Memory => {
                tracing::info!(scope, "Using in-memory rate limiter");
                Arc::new(InMemoryRateLimiter::new(config, clock))
            }
            RateLimitBackend::Postgres => {
                tracing::info!(scope, "Using Postgres rate limiter");
                Arc::new(PgRateLimiter::new(pool.clone(), retry, scope, config, clock))
            }
        }
    }
}
