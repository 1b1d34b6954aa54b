//! Verification token service
//!
//! Issues short-lived numeric codes bound to an identifier and a purpose,
//! and consumes them exactly once.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsdeck_audit::{AuditEvent, AuditEventType, AuditLog, Severity};
use opsdeck_common::{RepositoryError, SharedClock};
use rand::Rng;

use crate::domain::entities::{VerificationPurpose, VerificationToken};
use crate::domain::validation::{is_well_formed_code, Identifier};
use crate::error::{IdentityError, Result};
use crate::repository::TokenStore;
use crate::services::rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};

/// Fresh codes colliding with a live one are redrawn this many times
const MAX_CODE_COLLISIONS: u32 = 3;

/// Verification settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationConfig {
    /// Digits per code; codes are uniform over `[10^(d-1), 10^d - 1]`
    pub code_digits: u32,
    /// Delete older codes of the same purpose when issuing a new one
    pub replace_previous: bool,
    pub rate_limit: RateLimitConfig,
}

impl VerificationConfig {
    /// Supported code lengths; anything longer overflows the `u32` draw
    pub const CODE_DIGITS: RangeInclusive<u32> = 4..=9;
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_digits: 6,
            replace_previous: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// A code ready for out-of-band delivery
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub identifier: Identifier,
    pub purpose: VerificationPurpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedCode {
    #[mutants::skip] // Formatting only
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCode")
            .field("identifier", &self.identifier)
            .field("purpose", &self.purpose)
            .field("code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct VerificationService {
    tokens: Arc<dyn TokenStore>,
    limiter: Arc<dyn RateLimiter>,
    audit: AuditLog,
    clock: SharedClock,
    config: VerificationConfig,
}

impl VerificationService {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        limiter: Arc<dyn RateLimiter>,
        audit: AuditLog,
        clock: SharedClock,
        mut config: VerificationConfig,
    ) -> Self {
        let digits = &VerificationConfig::CODE_DIGITS;
        if !digits.contains(&config.code_digits) {
            let clamped = config.code_digits.clamp(*digits.start(), *digits.end());
            tracing::warn!(
                requested = config.code_digits,
                clamped,
                "Verification code length out of range"
            );
            config.code_digits = clamped;
        }
        Self {
            tokens,
            limiter,
            audit,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    fn parse_identifier(raw: &str) -> Result<Identifier> {
        Identifier::parse(raw).map_err(IdentityError::InvalidIdentifier)
    }

    fn event(
        &self,
        event_type: AuditEventType,
        severity: Severity,
        description: &str,
        identifier: &Identifier,
        purpose: Option<VerificationPurpose>,
    ) -> AuditEvent {
        let event = AuditEvent::new(event_type, severity, description, self.clock.now())
            .with_resource("verification_identifier", identifier.as_str());
        match purpose {
            Some(purpose) => event.with_metadata("purpose", purpose.as_str()),
            None => event,
        }
    }

    async fn rate_check(
        &self,
        identifier: &Identifier,
        purpose: VerificationPurpose,
        operation: &'static str,
    ) -> Result<()> {
        match self.limiter.check(identifier.as_str()).await {
            Ok(()) => Ok(()),
            Err(RateLimitError::Exceeded { retry_after }) => {
                tracing::warn!(purpose = %purpose, operation, "Verification rate limit exceeded");
                self.audit
                    .record(
                        self.event(
                            AuditEventType::VerificationRateLimited,
                            Severity::Warning,
                            "Verification attempts exceeded the rate limit",
                            identifier,
                            Some(purpose),
                        )
                        .with_metadata("operation", operation),
                    )
                    .await;
                Err(IdentityError::TooManyAttempts {
                    retry_after_seconds: retry_after.num_seconds().max(1) as u64,
                })
            }
            Err(RateLimitError::Store(e)) => Err(e.into()),
        }
    }

    fn draw_code(&self) -> String {
        let low = 10u32.pow(self.config.code_digits - 1);
        let high = 10u32.pow(self.config.code_digits) - 1;
        rand::thread_rng().gen_range(low..=high).to_string()
    }

    /// Issue a code for `identifier` and `purpose`
    pub async fn generate(&self, identifier: &str, purpose: VerificationPurpose) -> Result<IssuedCode> {
        let identifier = Self::parse_identifier(identifier)?;
        self.rate_check(&identifier, purpose, "generate").await?;

        if self.config.replace_previous {
            let replaced = self
                .tokens
                .delete_for_purpose(identifier.as_str(), purpose)
                .await?;
            tracing::debug!(purpose = %purpose, replaced, "Replaced previous verification codes");
        }

        let mut collisions = 0;
        let token = loop {
            let token = VerificationToken::new(
                identifier.as_str().to_string(),
                self.draw_code(),
                purpose,
                self.clock.now(),
            );
            match self.tokens.insert(&token).await {
                Ok(()) => break token,
                Err(RepositoryError::AlreadyExists) if collisions + 1 < MAX_CODE_COLLISIONS => {
                    collisions += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(purpose = %purpose, expires_at = %token.expires_at, "Verification code issued");
        self.audit
            .record(self.event(
                AuditEventType::VerificationIssued,
                Severity::Info,
                "Verification code issued",
                &identifier,
                Some(purpose),
            ))
            .await;

        Ok(IssuedCode {
            identifier,
            purpose,
            code: token.code,
            expires_at: token.expires_at,
        })
    }

    /// Consume a code; `Ok(false)` for a wrong, spent or expired code
    pub async fn verify(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<bool> {
        match self.verify_code(identifier, code, purpose).await {
            Ok(()) => Ok(true),
            Err(IdentityError::VerificationFailed | IdentityError::TokenExpired) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Consume a code, distinguishing an expired code from a wrong one
    pub async fn verify_code(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<()> {
        let identifier = Self::parse_identifier(identifier)?;
        self.rate_check(&identifier, purpose, "verify").await?;

        let now = self.clock.now();
        let consumed = if is_well_formed_code(code, self.config.code_digits) {
            self.tokens
                .consume(identifier.as_str(), code, purpose, now)
                .await?
        } else {
            None
        };

        if consumed.is_some() {
            tracing::info!(purpose = %purpose, "Verification code accepted");
            self.audit
                .record(self.event(
                    AuditEventType::VerificationSucceeded,
                    Severity::Info,
                    "Verification code accepted",
                    &identifier,
                    Some(purpose),
                ))
                .await;
            return Ok(());
        }

        let expired = if is_well_formed_code(code, self.config.code_digits) {
            self.tokens
                .find(identifier.as_str(), code, purpose)
                .await?
                .is_some_and(|token| token.is_expired_at(now))
        } else {
            false
        };
        let (error, reason) = if expired {
            (IdentityError::TokenExpired, "expired")
        } else {
            (IdentityError::VerificationFailed, "no_match")
        };

        tracing::info!(purpose = %purpose, reason, "Verification code rejected");
        self.audit
            .record(
                self.event(
                    AuditEventType::VerificationFailed,
                    Severity::Warning,
                    "Verification code rejected",
                    &identifier,
                    Some(purpose),
                )
                .with_metadata("reason", reason),
            )
            .await;
        Err(error)
    }

    /// Whether a code would currently verify, without consuming it
    pub async fn is_valid(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<bool> {
        let identifier = Self::parse_identifier(identifier)?;
        self.rate_check(&identifier, purpose, "is_valid").await?;

        if !is_well_formed_code(code, self.config.code_digits) {
            return Ok(false);
        }
        let now = self.clock.now();
        Ok(self
            .tokens
            .find(identifier.as_str(), code, purpose)
            .await?
            .is_some_and(|token| !token.is_expired_at(now)))
    }

    /// Delete every code held for `identifier`, across all purposes
    pub async fn invalidate_all(&self, identifier: &str) -> Result<u64> {
        let identifier = Self::parse_identifier(identifier)?;
        let removed = self.tokens.delete_for_identifier(identifier.as_str()).await?;

        tracing::info!(removed, "Verification codes invalidated");
        self.audit
            .record(
                self.event(
                    AuditEventType::TokensInvalidated,
                    Severity::Info,
                    "All verification codes invalidated",
                    &identifier,
                    None,
                )
                .with_metadata("removed", removed),
            )
            .await;
        Ok(removed)
    }

    /// Delete every code at or past its expiry
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let removed = self.tokens.delete_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Expired verification codes removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryTokenStore;
    use crate::services::rate_limit::InMemoryRateLimiter;
    use chrono::Duration;
    use opsdeck_audit::mock::MemoryAuditSink;
    use opsdeck_common::{Clock, ManualClock};

    const EMAIL: &str = "ops@example.com";

    struct Harness {
        service: VerificationService,
        tokens: InMemoryTokenStore,
        audit: MemoryAuditSink,
        clock: ManualClock,
    }

    fn harness_with(config: VerificationConfig) -> Harness {
        let clock = ManualClock::starting_now();
        let tokens = InMemoryTokenStore::new();
        let audit = MemoryAuditSink::new();
        let limiter = InMemoryRateLimiter::new(
            RateLimitConfig {
                max_attempts: 100,
                ..config.rate_limit
            },
            Arc::new(clock.clone()),
        );
        let service = VerificationService::new(
            Arc::new(tokens.clone()),
            Arc::new(limiter),
            AuditLog::new(Arc::new(audit.clone()), std::time::Duration::from_millis(100)),
            Arc::new(clock.clone()),
            config,
        );
        Harness {
            service,
            tokens,
            audit,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(VerificationConfig::default())
    }

    #[tokio::test]
    async fn test_generated_code_is_six_digits_in_range() {
        let h = harness();
        for _ in 0..50 {
            let issued = h
                .service
                .generate(EMAIL, VerificationPurpose::LoginCode)
                .await
                .unwrap();
            let value: u32 = issued.code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[tokio::test]
    async fn test_expiry_depends_on_purpose() {
        let h = harness();
        let now = h.clock.now();
        let login = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        let email = h
            .service
            .generate(EMAIL, VerificationPurpose::EmailVerification)
            .await
            .unwrap();
        let reset = h
            .service
            .generate(EMAIL, VerificationPurpose::PasswordReset)
            .await
            .unwrap();

        assert_eq!(login.expires_at, now + Duration::minutes(10));
        assert_eq!(email.expires_at, now + Duration::hours(24));
        assert_eq!(reset.expires_at, now + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();

        assert!(h
            .service
            .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
        assert!(!h
            .service
            .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_purposes_do_not_cross() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();

        assert!(!h
            .service
            .verify(EMAIL, &issued.code, VerificationPurpose::PasswordReset)
            .await
            .unwrap());
        assert!(h
            .service
            .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_is_not_found() {
        let h = harness();
        let now = h.clock.now();
        let token = VerificationToken {
            identifier: EMAIL.to_string(),
            code: "123456".to_string(),
            purpose: VerificationPurpose::LoginCode,
            expires_at: now - Duration::milliseconds(1),
            created_at: now - Duration::minutes(10),
        };
        h.tokens.insert(&token).await.unwrap();

        assert!(!h
            .service
            .is_valid(EMAIL, "123456", VerificationPurpose::LoginCode)
            .await
            .unwrap());
        assert!(!h
            .service
            .verify(EMAIL, "123456", VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_verify_code_reports_expiry_separately() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(10));

        let result = h
            .service
            .verify_code(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await;
        assert!(matches!(result, Err(IdentityError::TokenExpired)));

        let result = h
            .service
            .verify_code(EMAIL, "000000", VerificationPurpose::LoginCode)
            .await;
        assert!(matches!(result, Err(IdentityError::VerificationFailed)));
    }

    #[tokio::test]
    async fn test_is_valid_does_not_consume() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::EmailVerification)
            .await
            .unwrap();

        for _ in 0..2 {
            assert!(h
                .service
                .is_valid(EMAIL, &issued.code, VerificationPurpose::EmailVerification)
                .await
                .unwrap());
        }
        assert_eq!(h.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_identifier_is_normalised_across_calls() {
        let h = harness();
        let issued = h
            .service
            .generate("  OPS@Example.com", VerificationPurpose::LoginCode)
            .await
            .unwrap();
        assert_eq!(issued.identifier.as_str(), EMAIL);
        assert!(h
            .service
            .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_previous_codes_stay_valid_by_default() {
        let h = harness();
        let first = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        let _second = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();

        assert!(h
            .service
            .is_valid(EMAIL, &first.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_replace_previous_discards_older_codes() {
        let h = harness_with(VerificationConfig {
            replace_previous: true,
            ..VerificationConfig::default()
        });
        let first = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        let _other_purpose = h
            .service
            .generate(EMAIL, VerificationPurpose::PasswordReset)
            .await
            .unwrap();
        let second = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();

        assert_eq!(h.tokens.len(), 2);
        if first.code != second.code {
            assert!(!h
                .service
                .is_valid(EMAIL, &first.code, VerificationPurpose::LoginCode)
                .await
                .unwrap());
        }
        assert!(h
            .service
            .is_valid(EMAIL, &second.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_all_spans_purposes() {
        let h = harness();
        h.service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        h.service
            .generate(EMAIL, VerificationPurpose::PasswordReset)
            .await
            .unwrap();
        h.service
            .generate("other@example.com", VerificationPurpose::LoginCode)
            .await
            .unwrap();

        assert_eq!(h.service.invalidate_all(EMAIL).await.unwrap(), 2);
        assert_eq!(h.tokens.len(), 1);
        assert_eq!(h.audit.count_of(AuditEventType::TokensInvalidated), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let h = harness();
        h.service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        h.service
            .generate(EMAIL, VerificationPurpose::EmailVerification)
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(10));

        assert_eq!(h.service.cleanup_expired().await.unwrap(), 1);
        assert_eq!(h.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_to_failed_verifications() {
        let clock = ManualClock::starting_now();
        let tokens = InMemoryTokenStore::new();
        let audit = MemoryAuditSink::new();
        let service = VerificationService::new(
            Arc::new(tokens),
            Arc::new(InMemoryRateLimiter::new(
                RateLimitConfig::default(),
                Arc::new(clock.clone()),
            )),
            AuditLog::new(Arc::new(audit.clone()), std::time::Duration::from_millis(100)),
            Arc::new(clock.clone()),
            VerificationConfig::default(),
        );

        for _ in 0..3 {
            assert!(!service
                .verify(EMAIL, "000000", VerificationPurpose::LoginCode)
                .await
                .unwrap());
        }
        let result = service
            .verify(EMAIL, "000000", VerificationPurpose::LoginCode)
            .await;
        assert!(matches!(
            result,
            Err(IdentityError::TooManyAttempts {
                retry_after_seconds: 60
            })
        ));
        assert_eq!(audit.count_of(AuditEventType::VerificationRateLimited), 1);
        assert_eq!(audit.count_of(AuditEventType::VerificationFailed), 3);
    }

    #[tokio::test]
    async fn test_malformed_code_fails_without_store_lookup() {
        let h = harness();
        let result = h
            .service
            .verify_code(EMAIL, "12ab", VerificationPurpose::LoginCode)
            .await;
        assert!(matches!(result, Err(IdentityError::VerificationFailed)));
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejected() {
        let h = harness();
        let result = h
            .service
            .generate("not an identifier", VerificationPurpose::LoginCode)
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidIdentifier(_))));
        assert!(h.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_audit_never_contains_code() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        h.service
            .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap();

        for event in h.audit.events() {
            assert!(!event.description.contains(&issued.code));
            assert!(!event.metadata.to_string().contains(&issued.code));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_digits_are_clamped() {
        for (requested, expected) in [(0, 4), (1, 4), (10, 9), (u32::MAX, 9)] {
            let h = harness_with(VerificationConfig {
                code_digits: requested,
                ..VerificationConfig::default()
            });
            assert_eq!(h.service.config().code_digits, expected);

            let issued = h
                .service
                .generate(EMAIL, VerificationPurpose::LoginCode)
                .await
                .unwrap();
            assert_eq!(issued.code.len(), expected as usize);
            assert!(h
                .service
                .verify(EMAIL, &issued.code, VerificationPurpose::LoginCode)
                .await
                .unwrap());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_consume_once() {
        let h = harness();
        let issued = h
            .service
            .generate(EMAIL, VerificationPurpose::LoginCode)
            .await
            .unwrap();
        let service = Arc::new(h.service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let code = issued.code.clone();
                tokio::spawn(async move {
                    service
                        .verify(EMAIL, &code, VerificationPurpose::LoginCode)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert!(h.tokens.is_empty());
        assert_eq!(h.audit.count_of(AuditEventType::VerificationSucceeded), 1);
    }
}
