//! Access domain: permission types, inheritance resolution, grant lifecycle

pub mod api;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::permission::{Level, PermissionType, Tier};
pub use error::{AccessError, Result};

// Re-export repository types
pub use repository::{PermissionStore, PgPermissionStore, PgResourceRepository, ResourceRepository};

// Re-export services
pub use services::{PermissionManager, PermissionResolver, ResourceRegistry};

// Re-export API types
pub use api::routes;
pub use api::AccessState;
