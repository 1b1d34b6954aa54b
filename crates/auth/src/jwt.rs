//! JWT validation and token extraction helpers

use axum::http::HeaderValue;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::claims::PrincipalClaims;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Validate an HS256 access token
pub(crate) fn validate_jwt_token(
    token: &str,
    config: &AuthConfig,
) -> Result<PrincipalClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);

    if let Some(aud) = &config.audience {
        validation.set_audience(&[aud]);
    } else {
        validation.validate_aud = false;
    }

    if let Some(iss) = &config.issuer {
        validation.set_issuer(&[iss]);
    }

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_ref());

    let token_data = decode::<PrincipalClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        AuthError::InvalidToken
    })?;

    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
pub(crate) fn extract_bearer_token(header: &HeaderValue) -> Result<String, AuthError> {
    let header_str = header
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationFormat)?;

    if let Some(token) = header_str.strip_prefix("Bearer ") {
        Ok(token.to_string())
    } else {
        Err(AuthError::InvalidAuthorizationFormat)
    }
}

/// Mint an access token for `principal_id` valid for `ttl`.
///
/// Used by local tooling and tests; production tokens come from the login
/// flow that sits in front of this service.
pub fn issue_token(
    config: &AuthConfig,
    principal_id: Uuid,
    email: Option<String>,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = PrincipalClaims {
        sub: principal_id.to_string(),
        email,
        iat: now.timestamp() as u64,
        exp: (now + ttl).timestamp() as u64,
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_ref());
    encode(&Header::new(Algorithm::HS256), &claims, &key)
}
