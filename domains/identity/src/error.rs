//! Identity domain errors

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use opsdeck_common::RepositoryError;
use serde_json::json;

use crate::domain::state::StateError;

/// Result type for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Too many attempts, retry in {retry_after_seconds}s")]
    TooManyAttempts { retry_after_seconds: u64 },

    #[error("Account locked until {until}")]
    AccountLocked {
        until: DateTime<Utc>,
        retry_after_seconds: u64,
    },

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Invalid verification code")]
    VerificationFailed,

    #[error("Verification code expired")]
    TokenExpired,

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Principal not found")]
    PrincipalNotFound,

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Build `AccountLocked` with the wait measured from `now`
    pub fn account_locked(until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::AccountLocked {
            until,
            retry_after_seconds: seconds_until(until, now),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountLocked { .. } => StatusCode::LOCKED,
            Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::VerificationFailed | Self::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            Self::TokenExpired => StatusCode::GONE,
            Self::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::PrincipalNotFound => StatusCode::NOT_FOUND,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TooManyAttempts { .. } => "TOO_MANY_ATTEMPTS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Seconds the caller should wait, for throttling and lockout errors
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::TooManyAttempts {
                retry_after_seconds,
            }
            | Self::AccountLocked {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::TooManyAttempts {
                retry_after_seconds,
            } => format!(
                "Too many attempts. Try again in {} seconds",
                retry_after_seconds
            ),
            Self::AccountLocked {
                retry_after_seconds,
                ..
            } => format!(
                "Account temporarily locked. Try again in {} seconds",
                retry_after_seconds
            ),
            Self::AccountDisabled => "Account disabled".to_string(),
            Self::VerificationFailed => "Invalid code".to_string(),
            Self::TokenExpired => "Code expired".to_string(),
            Self::DeliveryFailed(_) => "Could not deliver the code".to_string(),
            Self::PrincipalNotFound => "Account not found".to_string(),
            Self::InvalidIdentifier(reason) => format!("Invalid identifier: {}", reason),
            Self::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

/// Whole seconds from `now` until `until`, rounded up, never negative
pub(crate) fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}

impl From<RepositoryError> for IdentityError {
    fn from(err: RepositoryError) -> Self {
        if err.is_retryable() {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<StateError> for IdentityError {
    fn from(err: StateError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Identity request failed");
        }

        let mut error = json!({
            "code": self.error_code(),
            "message": self.public_message(),
        });
        let retry_after = self.retry_after_seconds();
        if let Some(seconds) = retry_after {
            error["retry_after_seconds"] = json!(seconds);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
