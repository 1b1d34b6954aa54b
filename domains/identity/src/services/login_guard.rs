//! Login guard: consecutive-failure lockout
//!
//! Failures are counted per principal. Reaching `max_attempts` locks the
//! principal for `lockout_duration`; attempts during a lockout are rejected
//! without touching the counter. A success resets everything.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use opsdeck_audit::{AuditEvent, AuditEventType, AuditLog, Severity};
use opsdeck_common::SharedClock;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::{
    LoginAttempt, LoginFailureReason, LoginMethod, Principal, PrincipalStatus,
};
use crate::domain::state::{PrincipalEvent, PrincipalGuardContext, PrincipalStateMachine};
use crate::domain::validation::Identifier;
use crate::error::{IdentityError, Result};
use crate::repository::{LoginAttemptStore, PrincipalStore};
use crate::services::rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};

/// Lockout settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginGuardConfig {
    /// Consecutive failures that trigger a lockout
    pub max_attempts: i32,
    pub lockout_duration: Duration,
    /// Per-identifier throttle applied before credentials are checked
    pub throttle: RateLimitConfig,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::minutes(15),
            throttle: RateLimitConfig {
                max_attempts: 10,
                window: Duration::seconds(600),
            },
        }
    }
}

/// Result of recording an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoginOutcome {
    Succeeded,
    Failed { remaining_attempts: u32 },
    /// This failure triggered the lockout
    LockedOut { until: DateTime<Utc> },
}

pub struct LoginGuard {
    principals: Arc<dyn PrincipalStore>,
    attempts: Arc<dyn LoginAttemptStore>,
    throttle: Arc<dyn RateLimiter>,
    audit: AuditLog,
    clock: SharedClock,
    config: LoginGuardConfig,
}

impl LoginGuard {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        attempts: Arc<dyn LoginAttemptStore>,
        throttle: Arc<dyn RateLimiter>,
        audit: AuditLog,
        clock: SharedClock,
        config: LoginGuardConfig,
    ) -> Self {
        Self {
            principals,
            attempts,
            throttle,
            audit,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LoginGuardConfig {
        &self.config
    }

    fn event(
        &self,
        event_type: AuditEventType,
        severity: Severity,
        description: &str,
        principal_id: Uuid,
        method: LoginMethod,
    ) -> AuditEvent {
        AuditEvent::new(event_type, severity, description, self.clock.now())
            .with_principal(principal_id)
            .with_metadata("method", serde_json::json!(method))
    }

    async fn load(&self, principal_id: Uuid) -> Result<Principal> {
        self.principals
            .get(principal_id)
            .await?
            .ok_or(IdentityError::PrincipalNotFound)
    }

    async fn reject(
        &self,
        principal: &Principal,
        method: LoginMethod,
        reason: LoginFailureReason,
        now: DateTime<Utc>,
    ) -> Result<IdentityError> {
        self.attempts
            .append(&LoginAttempt::failure(principal.id, method, reason, now))
            .await?;

        let (error, reason_label) = match (reason, principal.lockout_until) {
            (LoginFailureReason::AccountLocked, Some(until)) => {
                (IdentityError::account_locked(until, now), "locked")
            }
            _ => (IdentityError::AccountDisabled, "disabled"),
        };

        tracing::warn!(principal_id = %principal.id, reason = reason_label, "Login attempt blocked");
        self.audit
            .record(
                self.event(
                    AuditEventType::LoginBlocked,
                    Severity::Warning,
                    "Login attempt blocked",
                    principal.id,
                    method,
                )
                .with_metadata("reason", reason_label),
            )
            .await;
        Ok(error)
    }

    /// Record an authentication attempt for `principal_id`.
    ///
    /// Returns `AccountLocked` while a lockout is in force and
    /// `AccountDisabled` for a disabled principal; neither increments the
    /// counter. The failure that reaches the threshold returns
    /// [`LoginOutcome::LockedOut`].
    pub async fn record_attempt(
        &self,
        principal_id: Uuid,
        succeeded: bool,
        method: LoginMethod,
    ) -> Result<LoginOutcome> {
        let now = self.clock.now();
        let principal = self.load(principal_id).await?;

        if principal.is_disabled() {
            return Err(self
                .reject(&principal, method, LoginFailureReason::AccountDisabled, now)
                .await?);
        }
        if principal.is_locked_at(now) {
            return Err(self
                .reject(&principal, method, LoginFailureReason::AccountLocked, now)
                .await?);
        }
        let mut status = principal.status;
        if principal.has_lapsed_lockout(now) {
            if status == PrincipalStatus::Locked {
                status = PrincipalStateMachine::transition(
                    status,
                    PrincipalEvent::LockoutExpired,
                    Some(&PrincipalGuardContext {
                        lockout_elapsed: true,
                    }),
                )?;
            }
            if self.principals.clear_lapsed_lockout(principal_id, now).await? {
                tracing::info!(principal_id = %principal_id, "Lapsed lockout cleared");
            }
        }

        if succeeded {
            self.principals.record_success(principal_id, now).await?;
            self.attempts
                .append(&LoginAttempt::success(principal_id, method, now))
                .await?;

            tracing::info!(principal_id = %principal_id, "Login succeeded");
            self.audit
                .record(self.event(
                    AuditEventType::LoginSucceeded,
                    Severity::Info,
                    "Login succeeded",
                    principal_id,
                    method,
                ))
                .await;
            return Ok(LoginOutcome::Succeeded);
        }

        let lockout_until = now + self.config.lockout_duration;
        let record = match self
            .principals
            .record_failure(principal_id, now, self.config.max_attempts, lockout_until)
            .await?
        {
            Some(record) => record,
            None => {
                // Another attempt locked or disabled the principal first
                let current = self.load(principal_id).await?;
                let reason = if current.is_disabled() {
                    LoginFailureReason::AccountDisabled
                } else {
                    LoginFailureReason::AccountLocked
                };
                return Err(self.reject(&current, method, reason, now).await?);
            }
        };

        self.attempts
            .append(&LoginAttempt::failure(
                principal_id,
                method,
                LoginFailureReason::InvalidCredentials,
                now,
            ))
            .await?;

        if let Some(until) = record.lockout_until {
            PrincipalStateMachine::transition(
                status,
                PrincipalEvent::LockoutTriggered,
                None,
            )?;
            tracing::warn!(
                principal_id = %principal_id,
                failed_attempts = record.failed_attempts,
                lockout_until = %until,
                "Principal locked out"
            );
            self.audit
                .record(
                    self.event(
                        AuditEventType::AccountLocked,
                        Severity::Alert,
                        "Account locked after repeated failures",
                        principal_id,
                        method,
                    )
                    .with_metadata("failed_attempts", record.failed_attempts)
                    .with_metadata("lockout_until", until.to_rfc3339()),
                )
                .await;
            return Ok(LoginOutcome::LockedOut { until });
        }

        let remaining_attempts = (self.config.max_attempts - record.failed_attempts).max(0) as u32;
        tracing::info!(
            principal_id = %principal_id,
            failed_attempts = record.failed_attempts,
            "Login failed"
        );
        self.audit
            .record(
                self.event(
                    AuditEventType::LoginFailed,
                    Severity::Warning,
                    "Login failed",
                    principal_id,
                    method,
                )
                .with_metadata("failed_attempts", record.failed_attempts),
            )
            .await;
        Ok(LoginOutcome::Failed { remaining_attempts })
    }

    /// Whether a lockout is in force; unknown principals are not locked
    pub async fn is_locked(&self, principal_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .principals
            .get(principal_id)
            .await?
            .is_some_and(|principal| principal.is_locked_at(now)))
    }

    /// Throttle pre-authentication attempts for a raw identifier
    pub async fn throttle(&self, identifier: &str) -> Result<()> {
        let identifier = Identifier::parse(identifier).map_err(IdentityError::InvalidIdentifier)?;
        match self.throttle.check(identifier.as_str()).await {
            Ok(()) => Ok(()),
            Err(RateLimitError::Exceeded { retry_after }) => {
                tracing::warn!("Login throttle exceeded");
                self.audit
                    .record(
                        AuditEvent::new(
                            AuditEventType::LoginBlocked,
                            Severity::Warning,
                            "Login attempt throttled",
                            self.clock.now(),
                        )
                        .with_resource("login_identifier", identifier.as_str())
                        .with_metadata("reason", "throttled"),
                    )
                    .await;
                Err(IdentityError::TooManyAttempts {
                    retry_after_seconds: retry_after.num_seconds().max(1) as u64,
                })
            }
            Err(RateLimitError::Store(e)) => Err(e.into()),
        }
    }

    /// Failed attempts recorded for `principal_id` within the trailing `window`
    pub async fn recent_failures(&self, principal_id: Uuid, window: Duration) -> Result<i64> {
        let since = self.clock.now() - window;
        Ok(self
            .attempts
            .count_failures_since(principal_id, since)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryLoginAttemptStore, InMemoryPrincipalStore};
    use crate::services::rate_limit::InMemoryRateLimiter;
    use opsdeck_audit::mock::MemoryAuditSink;
    use opsdeck_common::{Clock, ManualClock};

    struct Harness {
        guard: LoginGuard,
        principals: InMemoryPrincipalStore,
        attempts: InMemoryLoginAttemptStore,
        audit: MemoryAuditSink,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let clock = ManualClock::starting_now();
        let principals = InMemoryPrincipalStore::new();
        let attempts = InMemoryLoginAttemptStore::new();
        let audit = MemoryAuditSink::new();
        let config = LoginGuardConfig::default();
        let guard = LoginGuard::new(
            Arc::new(principals.clone()),
            Arc::new(attempts.clone()),
            Arc::new(InMemoryRateLimiter::new(
                config.throttle,
                Arc::new(clock.clone()),
            )),
            AuditLog::new(Arc::new(audit.clone()), std::time::Duration::from_millis(100)),
            Arc::new(clock.clone()),
            config,
        );
        Harness {
            guard,
            principals,
            attempts,
            audit,
            clock,
        }
    }

    fn principal(h: &Harness) -> Uuid {
        let principal = Principal::new(Some("ops@example.com".to_string()), h.clock.now());
        let id = principal.id;
        h.principals.insert(principal);
        id
    }

    async fn fail(h: &Harness, id: Uuid) -> Result<LoginOutcome> {
        h.guard.record_attempt(id, false, LoginMethod::Password).await
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_sixth_is_rejected() {
        let h = harness();
        let id = principal(&h);

        for remaining in (1..=4).rev() {
            assert_eq!(
                fail(&h, id).await.unwrap(),
                LoginOutcome::Failed {
                    remaining_attempts: remaining
                }
            );
        }
        let expected_until = h.clock.now() + Duration::minutes(15);
        assert_eq!(
            fail(&h, id).await.unwrap(),
            LoginOutcome::LockedOut {
                until: expected_until
            }
        );

        let err = fail(&h, id).await.unwrap_err();
        assert!(matches!(
            err,
            IdentityError::AccountLocked {
                retry_after_seconds: 900,
                ..
            }
        ));
        assert!(h.guard.is_locked(id).await.unwrap());
        assert_eq!(h.principals.get(id).await.unwrap().unwrap().failed_attempts, 5);
        assert_eq!(h.audit.count_of(AuditEventType::AccountLocked), 1);
        assert_eq!(h.audit.count_of(AuditEventType::LoginBlocked), 1);
    }

    #[tokio::test]
    async fn test_correct_credentials_rejected_while_locked() {
        let h = harness();
        let id = principal(&h);
        for _ in 0..5 {
            fail(&h, id).await.unwrap();
        }

        let result = h.guard.record_attempt(id, true, LoginMethod::Password).await;
        assert!(matches!(result, Err(IdentityError::AccountLocked { .. })));
    }

    #[tokio::test]
    async fn test_lockout_lapses_and_counter_restarts() {
        let h = harness();
        let id = principal(&h);
        for _ in 0..5 {
            fail(&h, id).await.unwrap();
        }

        h.clock.advance(Duration::minutes(15));
        assert!(!h.guard.is_locked(id).await.unwrap());

        assert_eq!(
            fail(&h, id).await.unwrap(),
            LoginOutcome::Failed {
                remaining_attempts: 4
            }
        );
        let principal = h.principals.get(id).await.unwrap().unwrap();
        assert_eq!(principal.failed_attempts, 1);
        assert_eq!(principal.status, PrincipalStatus::Active);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let h = harness();
        let id = principal(&h);
        for _ in 0..4 {
            fail(&h, id).await.unwrap();
        }

        assert_eq!(
            h.guard
                .record_attempt(id, true, LoginMethod::VerificationCode)
                .await
                .unwrap(),
            LoginOutcome::Succeeded
        );
        assert_eq!(h.principals.get(id).await.unwrap().unwrap().failed_attempts, 0);
        assert_eq!(
            fail(&h, id).await.unwrap(),
            LoginOutcome::Failed {
                remaining_attempts: 4
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_principal_rejected_without_increment() {
        let h = harness();
        let mut principal = Principal::new(None, h.clock.now());
        principal.status = PrincipalStatus::Disabled;
        let id = principal.id;
        h.principals.insert(principal);

        let result = h.guard.record_attempt(id, true, LoginMethod::Password).await;
        assert!(matches!(result, Err(IdentityError::AccountDisabled)));
        assert_eq!(h.principals.get(id).await.unwrap().unwrap().failed_attempts, 0);
        assert_eq!(h.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_principal() {
        let h = harness();
        let result = fail(&h, Uuid::new_v4()).await;
        assert!(matches!(result, Err(IdentityError::PrincipalNotFound)));
        assert!(!h.guard.is_locked(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_every_attempt_is_appended() {
        let h = harness();
        let id = principal(&h);
        for _ in 0..6 {
            let _ = fail(&h, id).await;
        }
        h.guard
            .record_attempt(id, true, LoginMethod::Password)
            .await
            .unwrap_err();

        assert_eq!(h.attempts.len(), 7);
        assert_eq!(
            h.guard
                .recent_failures(id, Duration::minutes(5))
                .await
                .unwrap(),
            7
        );
    }

    #[tokio::test]
    async fn test_recent_failures_respects_window() {
        let h = harness();
        let id = principal(&h);
        fail(&h, id).await.unwrap();
        h.clock.advance(Duration::minutes(10));
        fail(&h, id).await.unwrap();

        assert_eq!(
            h.guard
                .recent_failures(id, Duration::minutes(5))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_throttle_limits_identifier() {
        let h = harness();
        for _ in 0..10 {
            h.guard.throttle("Ops@Example.com").await.unwrap();
        }
        let result = h.guard.throttle("ops@example.com").await;
        assert!(matches!(
            result,
            Err(IdentityError::TooManyAttempts {
                retry_after_seconds: 600
            })
        ));
        assert_eq!(h.audit.count_of(AuditEventType::LoginBlocked), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_lock_exactly_once() {
        let h = harness();
        let id = principal(&h);
        let guard = Arc::new(h.guard);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move {
                    guard.record_attempt(id, false, LoginMethod::Password).await
                })
            })
            .collect();

        let (mut failed, mut locked_out, mut rejected) = (0, 0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(LoginOutcome::Failed { .. }) => failed += 1,
                Ok(LoginOutcome::LockedOut { .. }) => locked_out += 1,
                Err(IdentityError::AccountLocked { .. }) => rejected += 1,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(failed, 4);
        assert_eq!(locked_out, 1);
        assert_eq!(rejected, 7);
        assert!(guard.is_locked(id).await.unwrap());
        assert_eq!(h.principals.get(id).await.unwrap().unwrap().failed_attempts, 5);
        assert_eq!(h.attempts.len(), 12);
        assert_eq!(h.audit.count_of(AuditEventType::AccountLocked), 1);
    }
}
