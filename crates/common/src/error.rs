//! Common error types and handling for OpsDeck

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::RepositoryError;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the OpsDeck access core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Unexpected(_) | Error::Serialization(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unexpected(_) => "UNEXPECTED_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Error::NotFound("Record not found".to_string()),
            RepositoryError::AlreadyExists => Error::Conflict("Record already exists".to_string()),
            RepositoryError::InvalidData(msg) => Error::Validation(msg),
            e @ (RepositoryError::Connection(_) | RepositoryError::Timeout(_)) => {
                Error::StoreUnavailable(e.to_string())
            }
            RepositoryError::Query(e) => Error::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Server-side failures never echo their details to the caller
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Conflict("test".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::StoreUnavailable("test".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(Error::Conflict("test".to_string()).error_code(), "CONFLICT");
        assert_eq!(
            Error::StoreUnavailable("test".to_string()).error_code(),
            "STORE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            Error::from(RepositoryError::NotFound),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from(RepositoryError::AlreadyExists),
            Error::Conflict(_)
        ));
        assert!(matches!(
            Error::from(RepositoryError::Timeout(std::time::Duration::from_millis(5))),
            Error::StoreUnavailable(_)
        ));
        assert!(matches!(
            Error::from(RepositoryError::Connection(sqlx::Error::PoolTimedOut)),
            Error::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_server_error_hides_details() {
        let response = Error::Internal("secret detail".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
