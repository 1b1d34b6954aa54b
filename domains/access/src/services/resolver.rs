//! Permission resolver
//!
//! Answers whether a principal holds a permission type on a resource, either
//! directly or through a grant whose type inherits to cover it. The requested
//! type's tier decides which resource table `resource_id` refers to.

use std::sync::Arc;

use opsdeck_audit::{AuditEvent, AuditEventType, AuditLog, Severity};
use opsdeck_common::SharedClock;
use uuid::Uuid;

use crate::domain::entities::{ResourceKind, ResourceScope};
use crate::domain::permission::PermissionType;
use crate::error::{AccessError, Result};
use crate::repository::PermissionStore;
use crate::services::registry::ResourceRegistry;

pub struct PermissionResolver {
    permissions: Arc<dyn PermissionStore>,
    resources: ResourceRegistry,
    audit: AuditLog,
    clock: SharedClock,
}

impl PermissionResolver {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        resources: ResourceRegistry,
        audit: AuditLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            permissions,
            resources,
            audit,
            clock,
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    fn denial_event(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
        reason: &str,
    ) -> AuditEvent {
        let closure: Vec<&str> = permission_type
            .closure()
            .iter()
            .map(|t| t.as_str())
            .collect();
        let event = AuditEvent::new(
            AuditEventType::AccessDenied,
            Severity::Warning,
            "Permission check denied",
            self.clock.now(),
        )
        .with_principal(principal_id)
        .with_metadata("requested_type", permission_type.as_str())
        .with_metadata("searched_types", closure)
        .with_metadata("reason", reason);

        match (ResourceKind::for_tier(permission_type.tier()), resource_id) {
            (Some(kind), Some(id)) => event.with_resource(kind.as_str(), id.to_string()),
            _ => event,
        }
    }

    /// Whether `principal_id` holds `permission_type` on `resource_id`.
    ///
    /// Platform types ignore `resource_id`. Resource-scoped types without a
    /// resource, or naming an unknown resource, are `false`. A matching
    /// grant whose target lineage is not fully active yields
    /// [`AccessError::InactiveResource`].
    pub async fn has_permission(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<bool> {
        let closure = permission_type.closure();

        let scope = match ResourceKind::for_tier(permission_type.tier()) {
            None => ResourceScope::Platform,
            Some(kind) => {
                let Some(id) = resource_id else {
                    tracing::debug!(
                        principal_id = %principal_id,
                        permission_type = %permission_type,
                        "Resource-scoped check without a resource"
                    );
                    return Ok(false);
                };
                match self.resources.lineage(kind, id).await? {
                    Some(lineage) => ResourceScope::Lineage(lineage),
                    None => {
                        tracing::debug!(resource_id = %id, kind = %kind, "Unknown resource");
                        return Ok(false);
                    }
                }
            }
        };

        let Some(grant) = self
            .permissions
            .find_matching(principal_id, &closure, &scope)
            .await?
        else {
            return Ok(false);
        };

        if let ResourceScope::Lineage(lineage) = &scope {
            if let Some(inactive) = lineage.first_inactive() {
                let (kind, id) = (inactive.kind, inactive.id);
                tracing::info!(
                    principal_id = %principal_id,
                    permission_type = %permission_type,
                    inactive_kind = %kind,
                    inactive_id = %id,
                    "Grant matched on an inactive resource"
                );
                self.audit
                    .record(
                        self.denial_event(
                            principal_id,
                            permission_type,
                            resource_id,
                            "inactive_resource",
                        )
                        .with_metadata("inactive_kind", kind.as_str())
                        .with_metadata("inactive_id", id.to_string()),
                    )
                    .await;
                return Err(AccessError::InactiveResource { kind, id });
            }
        }

        let store = Arc::clone(&self.permissions);
        let (grant_id, at) = (grant.id, self.clock.now());
        tokio::spawn(async move {
            if let Err(e) = store.touch(grant_id, at).await {
                tracing::warn!(permission_id = %grant_id, error = %e, "Failed to touch permission");
            }
        });

        tracing::debug!(
            principal_id = %principal_id,
            permission_type = %permission_type,
            granted_by_type = %grant.permission_type,
            "Permission granted"
        );
        Ok(true)
    }

    /// Like [`has_permission`](Self::has_permission) but a denial is an
    /// error and is audited
    pub async fn require_permission(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<()> {
        if self
            .has_permission(principal_id, permission_type, resource_id)
            .await?
        {
            return Ok(());
        }

        tracing::warn!(
            principal_id = %principal_id,
            permission_type = %permission_type,
            "Permission denied"
        );
        self.audit
            .record(self.denial_event(principal_id, permission_type, resource_id, "no_grant"))
            .await;
        Err(AccessError::PermissionDenied {
            permission_type,
            resource_id,
        })
    }
}
