//! Route definitions for Identity domain API

use axum::{routing::post, Router};

use super::handlers::verification;
use super::state::IdentityState;

/// Create verification code routes
fn verification_routes() -> Router<IdentityState> {
    Router::new()
        .route("/v1/verification/send", post(verification::send_code))
        .route("/v1/verification/verify", post(verification::verify_code))
        .route("/v1/verification/check", post(verification::check_code))
}

/// Create all Identity domain API routes
pub fn routes() -> Router<IdentityState> {
    Router::new().merge(verification_routes())
}
