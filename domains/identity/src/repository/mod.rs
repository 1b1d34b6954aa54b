//! Store contracts and Postgres implementations for the identity domain
//!
//! Every mutation that races with itself is a single statement: token
//! consumption is `DELETE … RETURNING`, failure counting is a conditional
//! `UPDATE … RETURNING`.

pub mod login_attempts;
pub mod principals;
pub mod rate_limits;
pub mod tokens;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsdeck_common::{RepositoryError, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{
    FailureRecord, LoginAttempt, Principal, VerificationPurpose, VerificationToken,
};

pub use login_attempts::PgLoginAttemptStore;
pub use principals::PgPrincipalStore;
pub use rate_limits::PgRateLimiter;
pub use tokens::PgTokenStore;

type StoreResult<T> = std::result::Result<T, RepositoryError>;

/// Principal counters and lockout state
#[async_trait::async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Principal>>;

    /// Increment the failure counter unless a lockout is active or the
    /// principal is disabled. Sets `lockout_until` when the post-increment
    /// count reaches `max_attempts`. Returns `None` when the guard rejected
    /// the update.
    async fn record_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_attempts: i32,
        lockout_until: DateTime<Utc>,
    ) -> StoreResult<Option<FailureRecord>>;

    /// Reset the counter and lockout after a successful authentication
    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;

    /// Clear a lockout whose window has elapsed. No-op if still in force.
    async fn clear_lapsed_lockout(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;
}

/// Verification token persistence
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a token; a colliding `(identifier, purpose, code)` yields
    /// [`RepositoryError::AlreadyExists`]
    async fn insert(&self, token: &VerificationToken) -> StoreResult<()>;

    /// Atomically delete and return the matching unexpired token
    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<VerificationToken>>;

    /// Look up a token regardless of expiry
    async fn find(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> StoreResult<Option<VerificationToken>>;

    async fn delete_for_purpose(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> StoreResult<u64>;

    async fn delete_for_identifier(&self, identifier: &str) -> StoreResult<u64>;

    /// Delete rows with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Append-only login attempt trail
#[async_trait::async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn append(&self, attempt: &LoginAttempt) -> StoreResult<()>;

    async fn count_failures_since(
        &self,
        principal_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;
}

/// Combined Postgres store access for the identity domain
#[derive(Clone)]
pub struct IdentityRepositories {
    pub principals: Arc<dyn PrincipalStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub login_attempts: Arc<dyn LoginAttemptStore>,
}

impl IdentityRepositories {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self {
            principals: Arc::new(PgPrincipalStore::new(pool.clone(), retry)),
            tokens: Arc::new(PgTokenStore::new(pool.clone(), retry)),
            login_attempts: Arc::new(PgLoginAttemptStore::new(pool, retry)),
        }
    }
}
