//! Audit event model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    AccessDenied,
    PermissionGranted,
    PermissionRevoked,
    VerificationIssued,
    VerificationSucceeded,
    VerificationFailed,
    VerificationRateLimited,
    TokensInvalidated,
    LoginSucceeded,
    LoginFailed,
    LoginBlocked,
    AccountLocked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::PermissionGranted => "PERMISSION_GRANTED",
            Self::PermissionRevoked => "PERMISSION_REVOKED",
            Self::VerificationIssued => "VERIFICATION_ISSUED",
            Self::VerificationSucceeded => "VERIFICATION_SUCCEEDED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::VerificationRateLimited => "VERIFICATION_RATE_LIMITED",
            Self::TokensInvalidated => "TOKENS_INVALIDATED",
            Self::LoginSucceeded => "LOGIN_SUCCEEDED",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::LoginBlocked => "LOGIN_BLOCKED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Alert,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Alert => "ALERT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub principal_id: Option<Uuid>,
    pub event_type: AuditEventType,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub severity: Severity,
    pub description: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event with empty metadata and no resource
    pub fn new(
        event_type: AuditEventType,
        severity: Severity,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            principal_id: None,
            event_type,
            resource_type: None,
            resource_id: None,
            severity,
            description: description.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            timestamp,
        }
    }

    pub fn with_principal(mut self, principal_id: Uuid) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Attach a metadata entry; non-object metadata is replaced by an object
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !self.metadata.is_object() {
            self.metadata = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}
