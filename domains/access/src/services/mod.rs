//! Access services

pub mod manager;
pub mod registry;
pub mod resolver;

pub use manager::PermissionManager;
pub use registry::ResourceRegistry;
pub use resolver::PermissionResolver;
