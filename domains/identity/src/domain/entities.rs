//! Identity domain entities

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account status
///
/// `Locked` is temporary and bounded by `lockout_until`; `Disabled` is an
/// administrative, permanent denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "principal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    #[default]
    Active,
    Locked,
    Disabled,
}

impl fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Locked => write!(f, "locked"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// An authenticating account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    pub status: PrincipalStatus,
    pub failed_attempts: i32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Create a fresh active principal
    pub fn new(email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            status: PrincipalStatus::Active,
            failed_attempts: 0,
            lockout_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a lockout is in force at `now`
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| until > now)
    }

    /// A lockout was set but has run out and not yet been cleared
    pub fn has_lapsed_lockout(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| until <= now)
    }

    pub fn is_disabled(&self) -> bool {
        self.status == PrincipalStatus::Disabled
    }
}

/// What a verification code is for. Purposes never satisfy each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    LoginCode,
    EmailVerification,
    PhoneVerification,
    PasswordReset,
}

impl VerificationPurpose {
    /// Lifetime of a code issued for this purpose
    pub fn ttl(&self) -> Duration {
        match self {
            Self::LoginCode | Self::PhoneVerification => Duration::minutes(10),
            Self::EmailVerification => Duration::hours(24),
            Self::PasswordReset => Duration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginCode => "login_code",
            Self::EmailVerification => "email_verification",
            Self::PhoneVerification => "phone_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for VerificationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted single-use code
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VerificationToken {
    pub identifier: String,
    pub code: String,
    pub purpose: VerificationPurpose,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(
        identifier: String,
        code: String,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            expires_at: now + purpose.ttl(),
            identifier,
            code,
            purpose,
            created_at: now,
        }
    }

    /// Usable strictly before `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationToken")
            .field("identifier", &self.identifier)
            .field("code", &"<redacted>")
            .field("purpose", &self.purpose)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// How a principal tried to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "login_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    #[default]
    Password,
    VerificationCode,
    Sso,
}

/// Why an attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "login_failure_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoginFailureReason {
    InvalidCredentials,
    AccountLocked,
    AccountDisabled,
}

/// Persisted authentication attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub succeeded: bool,
    pub method: LoginMethod,
    pub failure_reason: Option<LoginFailureReason>,
    pub created_at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn success(principal_id: Uuid, method: LoginMethod, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id,
            succeeded: true,
            method,
            failure_reason: None,
            created_at: now,
        }
    }

    pub fn failure(
        principal_id: Uuid,
        method: LoginMethod,
        reason: LoginFailureReason,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id,
            succeeded: false,
            method,
            failure_reason: Some(reason),
            created_at: now,
        }
    }
}

/// Counter state returned by an atomic failure increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct FailureRecord {
    pub failed_attempts: i32,
    pub lockout_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_ttls() {
        assert_eq!(VerificationPurpose::LoginCode.ttl(), Duration::minutes(10));
        assert_eq!(VerificationPurpose::PhoneVerification.ttl(), Duration::minutes(10));
        assert_eq!(VerificationPurpose::EmailVerification.ttl(), Duration::hours(24));
        assert_eq!(VerificationPurpose::PasswordReset.ttl(), Duration::hours(1));
    }

    #[test]
    fn test_token_expiry_boundary() {
        let now = Utc::now();
        let mut token = VerificationToken::new(
            "ops@example.com".to_string(),
            "123456".to_string(),
            VerificationPurpose::LoginCode,
            now,
        );
        assert!(!token.is_expired_at(now));

        token.expires_at = now;
        assert!(token.is_expired_at(now));

        token.expires_at = now - Duration::milliseconds(1);
        assert!(token.is_expired_at(now));
    }

    #[test]
    fn test_token_debug_redacts_code() {
        let token = VerificationToken::new(
            "ops@example.com".to_string(),
            "987654".to_string(),
            VerificationPurpose::LoginCode,
            Utc::now(),
        );
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("987654"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_principal_lockout_predicates() {
        let now = Utc::now();
        let mut principal = Principal::new(None, now);
        assert!(!principal.is_locked_at(now));
        assert!(!principal.has_lapsed_lockout(now));

        principal.lockout_until = Some(now + Duration::minutes(15));
        assert!(principal.is_locked_at(now));
        assert!(!principal.has_lapsed_lockout(now));

        let later = now + Duration::minutes(15);
        assert!(!principal.is_locked_at(later));
        assert!(principal.has_lapsed_lockout(later));
    }

    #[test]
    fn test_purpose_wire_names() {
        assert_eq!(
            serde_json::to_value(VerificationPurpose::PasswordReset).unwrap(),
            serde_json::json!("password_reset")
        );
        let parsed: VerificationPurpose = serde_json::from_str("\"login_code\"").unwrap();
        assert_eq!(parsed, VerificationPurpose::LoginCode);
    }
}
