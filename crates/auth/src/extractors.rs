//! Axum extractors for authentication
//!
//! Generic over any state `S` where `AuthConfig: FromRef<S>`.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwt::{extract_bearer_token, validate_jwt_token};

/// Principal established from a bearer token
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub principal_id: Uuid,
    pub email: Option<String>,
}

impl<S> FromRequestParts<S> for AuthPrincipal
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;

        let token = extract_bearer_token(auth_header)?;
        let claims = validate_jwt_token(&token, &config)?;

        let principal_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidPrincipalId)?;

        Ok(AuthPrincipal {
            principal_id,
            email: claims.email,
        })
    }
}
