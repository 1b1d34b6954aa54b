//! Access domain errors
//!
//! Denials and inactive resources share one public body so a caller cannot
//! tell which resources exist or why access was refused.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opsdeck_common::RepositoryError;
use serde_json::json;
use uuid::Uuid;

use crate::domain::entities::ResourceKind;
use crate::domain::permission::PermissionType;

/// Result type for access operations
pub type Result<T> = std::result::Result<T, AccessError>;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Permission {permission_type} denied on {resource_id:?}")]
    PermissionDenied {
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    },

    #[error("{kind} {id} is not active")]
    InactiveResource { kind: ResourceKind, id: Uuid },

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PermissionDenied { .. } | Self::InactiveResource { .. } => StatusCode::FORBIDDEN,
            Self::InvalidGrant(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } | Self::InactiveResource { .. } => "ACCESS_DENIED",
            Self::InvalidGrant(_) => "INVALID_GRANT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a denial rather than a failure
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::InactiveResource { .. }
        )
    }

    fn public_message(&self) -> String {
        match self {
            Self::PermissionDenied { .. } | Self::InactiveResource { .. } => {
                "Access denied".to_string()
            }
            Self::InvalidGrant(msg) => msg.clone(),
            Self::NotFound(what) => format!("{} not found", what),
            Self::Conflict(msg) => msg.clone(),
            Self::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<RepositoryError> for AccessError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::AlreadyExists => Self::Conflict("Permission already granted".to_string()),
            e if e.is_retryable() => Self::StoreUnavailable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Access request failed");
        }

        (
            status,
            Json(json!({
                "error": {
                    "code": self.error_code(),
                    "message": self.public_message(),
                }
            })),
        )
            .into_response()
    }
}
