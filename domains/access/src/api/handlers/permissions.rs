//! Permission handlers
//!
//! - GET /v1/permissions/check   - Check the caller's own permission
//! - GET /v1/permissions         - List the caller's grants
//! - POST /v1/permissions        - Grant a permission
//! - DELETE /v1/permissions/{id} - Revoke a grant

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use opsdeck_auth::AuthPrincipal;
use opsdeck_common::ValidatedJson;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::state::AccessState;
use crate::domain::entities::Permission;
use crate::domain::permission::PermissionType;
use crate::error::Result;

// ============================================================
// DTOs
// ============================================================

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(rename = "type")]
    pub permission_type: PermissionType,
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GrantRequest {
    pub principal_id: Uuid,
    pub permission_type: PermissionType,
    pub resource_id: Option<Uuid>,
}

// ============================================================
// Handlers
// ============================================================

/// GET /v1/permissions/check
pub async fn check_permission(
    principal: AuthPrincipal,
    State(state): State<AccessState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>> {
    let allowed = state
        .resolver
        .has_permission(
            principal.principal_id,
            query.permission_type,
            query.resource_id,
        )
        .await?;
    Ok(Json(CheckResponse { allowed }))
}

/// GET /v1/permissions
pub async fn list_permissions(
    principal: AuthPrincipal,
    State(state): State<AccessState>,
) -> Result<Json<Vec<Permission>>> {
    let permissions = state
        .manager
        .list_for_principal(principal.principal_id)
        .await?;
    Ok(Json(permissions))
}

/// POST /v1/permissions
pub async fn grant_permission(
    principal: AuthPrincipal,
    State(state): State<AccessState>,
    ValidatedJson(request): ValidatedJson<GrantRequest>,
) -> Result<(StatusCode, Json<Permission>)> {
    let permission = state
        .manager
        .grant(
            principal.principal_id,
            request.principal_id,
            request.permission_type,
            request.resource_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// DELETE /v1/permissions/{id}
pub async fn revoke_permission(
    principal: AuthPrincipal,
    State(state): State<AccessState>,
    Path(permission_id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .manager
        .revoke(principal.principal_id, permission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
