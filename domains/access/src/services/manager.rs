//! Grant lifecycle
//!
//! Granting or revoking a resource-scoped permission requires the tier's
//! `ADMIN` on the target resource, which may itself be inherited. Platform
//! grants require `PLATFORM_ADMIN`, and a `PLATFORM_ADMIN` may manage any
//! grant.

use std::sync::Arc;

use opsdeck_audit::{AuditEvent, AuditEventType, AuditLog, Severity};
use opsdeck_common::{RepositoryError, SharedClock};
use uuid::Uuid;

use crate::domain::entities::{Permission, ResourceKind};
use crate::domain::permission::{Level, PermissionType};
use crate::error::{AccessError, Result};
use crate::repository::PermissionStore;
use crate::services::resolver::PermissionResolver;

pub struct PermissionManager {
    resolver: Arc<PermissionResolver>,
    permissions: Arc<dyn PermissionStore>,
    audit: AuditLog,
    clock: SharedClock,
}

impl PermissionManager {
    pub fn new(
        resolver: Arc<PermissionResolver>,
        permissions: Arc<dyn PermissionStore>,
        audit: AuditLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            resolver,
            permissions,
            audit,
            clock,
        }
    }

    /// Require `actor` to administer grants of `permission_type` on `resource_id`
    async fn authorize(
        &self,
        actor: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<()> {
        if self
            .resolver
            .has_permission(actor, PermissionType::PlatformAdmin, None)
            .await?
        {
            return Ok(());
        }
        let admin = PermissionType::from_parts(permission_type.tier(), Level::Admin);
        self.resolver
            .require_permission(actor, admin, resource_id)
            .await
    }

    fn event(
        &self,
        event_type: AuditEventType,
        description: &str,
        actor: Uuid,
        permission: &Permission,
    ) -> AuditEvent {
        AuditEvent::new(event_type, Severity::Info, description, self.clock.now())
            .with_principal(actor)
            .with_resource("permission", permission.id.to_string())
            .with_metadata("grantee", permission.principal_id.to_string())
            .with_metadata("permission_type", permission.permission_type.as_str())
            .with_metadata(
                "target_resource",
                permission
                    .resource_id()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            )
    }

    /// Grant `permission_type` on `resource_id` to `principal_id`
    pub async fn grant(
        &self,
        actor: Uuid,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<Permission> {
        let permission = Permission::new(
            principal_id,
            permission_type,
            resource_id,
            Some(actor),
            self.clock.now(),
        )
        .map_err(AccessError::InvalidGrant)?;

        self.authorize(actor, permission_type, resource_id).await?;

        // Platform admins skip the resource lookup in authorize
        if let (Some(kind), Some(id)) = (ResourceKind::for_tier(permission_type.tier()), resource_id)
        {
            let lineage = self
                .resolver
                .resources()
                .lineage(kind, id)
                .await?
                .ok_or_else(|| AccessError::NotFound(format!("{} {}", kind, id)))?;
            if let Some(inactive) = lineage.first_inactive() {
                return Err(AccessError::InactiveResource {
                    kind: inactive.kind,
                    id: inactive.id,
                });
            }
        }

        self.permissions
            .create(&permission)
            .await
            .map_err(|e| match e {
                RepositoryError::AlreadyExists => AccessError::Conflict(format!(
                    "{} already granted on this resource",
                    permission_type
                )),
                other => other.into(),
            })?;

        tracing::info!(
            actor = %actor,
            principal_id = %principal_id,
            permission_type = %permission_type,
            permission_id = %permission.id,
            "Permission granted"
        );
        self.audit
            .record(self.event(
                AuditEventType::PermissionGranted,
                "Permission granted",
                actor,
                &permission,
            ))
            .await;
        Ok(permission)
    }

    /// Revoke a grant by id
    pub async fn revoke(&self, actor: Uuid, permission_id: Uuid) -> Result<Permission> {
        let permission = self
            .permissions
            .get(permission_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("Permission".to_string()))?;

        self.authorize(actor, permission.permission_type, permission.resource_id())
            .await?;

        if !self.permissions.delete(permission_id).await? {
            return Err(AccessError::NotFound("Permission".to_string()));
        }

        tracing::info!(
            actor = %actor,
            permission_id = %permission_id,
            permission_type = %permission.permission_type,
            "Permission revoked"
        );
        self.audit
            .record(self.event(
                AuditEventType::PermissionRevoked,
                "Permission revoked",
                actor,
                &permission,
            ))
            .await;
        Ok(permission)
    }

    pub async fn list_for_principal(&self, principal_id: Uuid) -> Result<Vec<Permission>> {
        Ok(self.permissions.list_for_principal(principal_id).await?)
    }
}
