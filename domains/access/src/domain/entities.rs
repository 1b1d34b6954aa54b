//! Domain entities for the Access domain

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::{PermissionType, Tier};

/// A persisted grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub permission_type: PermissionType,
    pub workspace_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub granted_by: Option<Uuid>,
}

impl Permission {
    /// Build a grant with the resource column chosen by the type's tier.
    ///
    /// `resource_id` must be `None` exactly for platform types.
    pub fn new(
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
        granted_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let tier = permission_type.tier();
        let mut permission = Self {
            id: Uuid::new_v4(),
            principal_id,
            permission_type,
            workspace_id: None,
            client_id: None,
            location_id: None,
            last_accessed_at: None,
            created_at: now,
            granted_by,
        };
        match (tier, resource_id) {
            (Tier::Platform, None) => {}
            (Tier::Platform, Some(_)) => {
                return Err(format!("{} grants cannot name a resource", permission_type))
            }
            (_, None) => {
                return Err(format!("{} grants require a resource id", permission_type))
            }
            (Tier::Workspace, Some(id)) => permission.workspace_id = Some(id),
            (Tier::Client, Some(id)) => permission.client_id = Some(id),
            (Tier::Location, Some(id)) => permission.location_id = Some(id),
        }
        Ok(permission)
    }

    /// The resource the grant names, if any
    pub fn resource_id(&self) -> Option<Uuid> {
        self.location_id.or(self.client_id).or(self.workspace_id)
    }

    /// Exactly the tier's column is set, or none for platform grants
    pub fn has_valid_shape(&self) -> bool {
        let set = (
            self.workspace_id.is_some(),
            self.client_id.is_some(),
            self.location_id.is_some(),
        );
        match self.permission_type.tier() {
            Tier::Platform => set == (false, false, false),
            Tier::Workspace => set == (true, false, false),
            Tier::Client => set == (false, true, false),
            Tier::Location => set == (false, false, true),
        }
    }

    /// Whether this grant applies to `scope`
    pub fn matches_scope(&self, scope: &ResourceScope) -> bool {
        match scope {
            ResourceScope::Platform => {
                self.workspace_id.is_none() && self.client_id.is_none() && self.location_id.is_none()
            }
            ResourceScope::Lineage(lineage) => {
                let tier_id = match self.permission_type.tier() {
                    Tier::Platform => return false,
                    Tier::Workspace => self.workspace_id,
                    Tier::Client => self.client_id,
                    Tier::Location => self.location_id,
                };
                tier_id.is_some()
                    && ResourceKind::for_tier(self.permission_type.tier())
                        .and_then(|kind| lineage.id_for(kind))
                        == tier_id
            }
        }
    }
}

/// Kinds of resources grants can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Workspace,
    Client,
    Location,
}

impl ResourceKind {
    pub fn parent(&self) -> Option<ResourceKind> {
        match self {
            Self::Workspace => None,
            Self::Client => Some(Self::Workspace),
            Self::Location => Some(Self::Client),
        }
    }

    pub fn for_tier(tier: Tier) -> Option<ResourceKind> {
        match tier {
            Tier::Platform => None,
            Tier::Workspace => Some(Self::Workspace),
            Tier::Client => Some(Self::Client),
            Tier::Location => Some(Self::Location),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Client => "client",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "resource_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl ResourceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// One workspace, client or location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status: ResourceStatus,
}

/// A resource and its ancestors, target first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLineage {
    nodes: Vec<ResourceNode>,
}

impl ResourceLineage {
    pub fn new(nodes: Vec<ResourceNode>) -> Self {
        Self { nodes }
    }

    pub fn target(&self) -> Option<&ResourceNode> {
        self.nodes.first()
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Id of the lineage member of `kind`, if the lineage reaches that tier
    pub fn id_for(&self, kind: ResourceKind) -> Option<Uuid> {
        self.nodes.iter().find(|n| n.kind == kind).map(|n| n.id)
    }

    /// Closest non-active member, starting from the target
    pub fn first_inactive(&self) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| !n.status.is_active())
    }
}

/// What a permission query is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    /// Only grants naming no resource
    Platform,
    /// Grants naming any member of the lineage at the grant's own tier
    Lineage(ResourceLineage),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: ResourceKind, parent_id: Option<Uuid>) -> ResourceNode {
        ResourceNode {
            kind,
            id: Uuid::new_v4(),
            parent_id,
            status: ResourceStatus::Active,
        }
    }

    fn lineage() -> ResourceLineage {
        let workspace = node(ResourceKind::Workspace, None);
        let client = node(ResourceKind::Client, Some(workspace.id));
        let location = node(ResourceKind::Location, Some(client.id));
        ResourceLineage::new(vec![location, client, workspace])
    }

    #[test]
    fn test_new_sets_tier_column() {
        let resource = Uuid::new_v4();
        let grant = Permission::new(
            Uuid::new_v4(),
            PermissionType::ClientEditor,
            Some(resource),
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(grant.client_id, Some(resource));
        assert!(grant.workspace_id.is_none() && grant.location_id.is_none());
        assert!(grant.has_valid_shape());
        assert_eq!(grant.resource_id(), Some(resource));
    }

    #[test]
    fn test_new_rejects_mismatched_shapes() {
        assert!(Permission::new(
            Uuid::new_v4(),
            PermissionType::PlatformAdmin,
            Some(Uuid::new_v4()),
            None,
            Utc::now()
        )
        .is_err());
        assert!(Permission::new(
            Uuid::new_v4(),
            PermissionType::LocationViewer,
            None,
            None,
            Utc::now()
        )
        .is_err());
    }

    #[test]
    fn test_workspace_grant_matches_descendant_lineage() {
        let lineage = lineage();
        let workspace_id = lineage.id_for(ResourceKind::Workspace);
        let grant = Permission::new(
            Uuid::new_v4(),
            PermissionType::WorkspaceAdmin,
            workspace_id,
            None,
            Utc::now(),
        )
        .unwrap();

        assert!(grant.matches_scope(&ResourceScope::Lineage(lineage)));
        assert!(!grant.matches_scope(&ResourceScope::Platform));
    }

    #[test]
    fn test_grant_on_sibling_does_not_match() {
        let grant = Permission::new(
            Uuid::new_v4(),
            PermissionType::ClientAdmin,
            Some(Uuid::new_v4()),
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(!grant.matches_scope(&ResourceScope::Lineage(lineage())));
    }

    #[test]
    fn test_first_inactive_finds_archived_ancestor() {
        let mut lineage = lineage();
        lineage.nodes[2].status = ResourceStatus::Archived;
        assert_eq!(
            lineage.first_inactive().map(|n| n.kind),
            Some(ResourceKind::Workspace)
        );
    }

    #[test]
    fn test_parent_chain() {
        assert_eq!(ResourceKind::Location.parent(), Some(ResourceKind::Client));
        assert_eq!(ResourceKind::Client.parent(), Some(ResourceKind::Workspace));
        assert_eq!(ResourceKind::Workspace.parent(), None);
    }
}
