//! Permission types and the inheritance table
//!
//! A permission type is a tier crossed with a level. Within a tier
//! `ADMIN ⊇ EDITOR ⊇ VIEWER`; a higher-tier `ADMIN` covers every level of the
//! tiers beneath it for the same subtree. Platform grants never cover
//! resource-scoped checks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scope tier, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Platform,
    Workspace,
    Client,
    Location,
}

impl Tier {
    /// Whether grants at this tier name a resource
    pub fn is_resource_scoped(&self) -> bool {
        !matches!(self, Self::Platform)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "PLATFORM",
            Self::Workspace => "WORKSPACE",
            Self::Client => "CLIENT",
            Self::Location => "LOCATION",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level within a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Viewer,
    Editor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "permission_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    PlatformAdmin,
    PlatformEditor,
    PlatformViewer,
    WorkspaceAdmin,
    WorkspaceEditor,
    WorkspaceViewer,
    ClientAdmin,
    ClientEditor,
    ClientViewer,
    LocationAdmin,
    LocationEditor,
    LocationViewer,
}

impl PermissionType {
    pub const ALL: [PermissionType; 12] = [
        Self::PlatformAdmin,
        Self::PlatformEditor,
        Self::PlatformViewer,
        Self::WorkspaceAdmin,
        Self::WorkspaceEditor,
        Self::WorkspaceViewer,
        Self::ClientAdmin,
        Self::ClientEditor,
        Self::ClientViewer,
        Self::LocationAdmin,
        Self::LocationEditor,
        Self::LocationViewer,
    ];

    pub fn tier(&self) -> Tier {
        match self {
            Self::PlatformAdmin | Self::PlatformEditor | Self::PlatformViewer => Tier::Platform,
            Self::WorkspaceAdmin | Self::WorkspaceEditor | Self::WorkspaceViewer => {
                Tier::Workspace
            }
            Self::ClientAdmin | Self::ClientEditor | Self::ClientViewer => Tier::Client,
            Self::LocationAdmin | Self::LocationEditor | Self::LocationViewer => Tier::Location,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Self::PlatformAdmin
            | Self::WorkspaceAdmin
            | Self::ClientAdmin
            | Self::LocationAdmin => Level::Admin,
            Self::PlatformEditor
            | Self::WorkspaceEditor
            | Self::ClientEditor
            | Self::LocationEditor => Level::Editor,
            Self::PlatformViewer
            | Self::WorkspaceViewer
            | Self::ClientViewer
            | Self::LocationViewer => Level::Viewer,
        }
    }

    pub fn from_parts(tier: Tier, level: Level) -> Self {
        match (tier, level) {
            (Tier::Platform, Level::Admin) => Self::PlatformAdmin,
            (Tier::Platform, Level::Editor) => Self::PlatformEditor,
            (Tier::Platform, Level::Viewer) => Self::PlatformViewer,
            (Tier::Workspace, Level::Admin) => Self::WorkspaceAdmin,
            (Tier::Workspace, Level::Editor) => Self::WorkspaceEditor,
            (Tier::Workspace, Level::Viewer) => Self::WorkspaceViewer,
            (Tier::Client, Level::Admin) => Self::ClientAdmin,
            (Tier::Client, Level::Editor) => Self::ClientEditor,
            (Tier::Client, Level::Viewer) => Self::ClientViewer,
            (Tier::Location, Level::Admin) => Self::LocationAdmin,
            (Tier::Location, Level::Editor) => Self::LocationEditor,
            (Tier::Location, Level::Viewer) => Self::LocationViewer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlatformAdmin => "PLATFORM_ADMIN",
            Self::PlatformEditor => "PLATFORM_EDITOR",
            Self::PlatformViewer => "PLATFORM_VIEWER",
            Self::WorkspaceAdmin => "WORKSPACE_ADMIN",
            Self::WorkspaceEditor => "WORKSPACE_EDITOR",
            Self::WorkspaceViewer => "WORKSPACE_VIEWER",
            Self::ClientAdmin => "CLIENT_ADMIN",
            Self::ClientEditor => "CLIENT_EDITOR",
            Self::ClientViewer => "CLIENT_VIEWER",
            Self::LocationAdmin => "LOCATION_ADMIN",
            Self::LocationEditor => "LOCATION_EDITOR",
            Self::LocationViewer => "LOCATION_VIEWER",
        }
    }

    /// Types whose holders also hold `self`, excluding `self`
    pub fn inherited_by(&self) -> &'static [PermissionType] {
        use PermissionType::*;
        match self {
            PlatformAdmin | WorkspaceAdmin => &[],
            PlatformEditor => &[PlatformAdmin],
            PlatformViewer => &[PlatformEditor, PlatformAdmin],
            WorkspaceEditor => &[WorkspaceAdmin],
            WorkspaceViewer => &[WorkspaceEditor, WorkspaceAdmin],
            ClientAdmin => &[WorkspaceAdmin],
            ClientEditor => &[ClientAdmin, WorkspaceAdmin],
            ClientViewer => &[ClientEditor, ClientAdmin, WorkspaceAdmin],
            LocationAdmin => &[ClientAdmin, WorkspaceAdmin],
            LocationEditor => &[LocationAdmin, ClientAdmin, WorkspaceAdmin],
            LocationViewer => &[LocationEditor, LocationAdmin, ClientAdmin, WorkspaceAdmin],
        }
    }

    /// `{self} ∪ inherited_by(self)`, with `self` first
    pub fn closure(&self) -> Vec<PermissionType> {
        std::iter::once(*self)
            .chain(self.inherited_by().iter().copied())
            .collect()
    }

    /// Whether holding `self` satisfies a check for `requested`
    pub fn satisfies(&self, requested: PermissionType) -> bool {
        *self == requested || requested.inherited_by().contains(self)
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown permission type '{}'", s))
    }
}
