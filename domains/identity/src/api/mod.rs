//! API layer for the Identity domain
//!
//! Contains HTTP handlers, routes, and domain state definition.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::routes;
pub use state::IdentityState;
