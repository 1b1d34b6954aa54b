//! Route definitions for Access domain API

use axum::{
    routing::{delete, get},
    Router,
};

use super::handlers::permissions;
use super::state::AccessState;

/// Create all Access domain API routes
pub fn routes() -> Router<AccessState> {
    Router::new()
        .route("/v1/permissions/check", get(permissions::check_permission))
        .route(
            "/v1/permissions",
            get(permissions::list_permissions).post(permissions::grant_permission),
        )
        .route("/v1/permissions/{id}", delete(permissions::revoke_permission))
}
