//! Authentication errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    MissingAuthorization,
    InvalidAuthorizationFormat,
    InvalidToken,
    InvalidPrincipalId,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingAuthorization => (
                StatusCode::UNAUTHORIZED,
                "MISSING_AUTHORIZATION",
                "Authorization header required",
            ),
            AuthError::InvalidAuthorizationFormat => (
                StatusCode::UNAUTHORIZED,
                "INVALID_AUTHORIZATION",
                "Invalid authorization header format",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid or expired token",
            ),
            AuthError::InvalidPrincipalId => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid principal ID in token",
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
