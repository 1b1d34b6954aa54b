//! API layer for the Access domain
//!
//! Contains HTTP handlers, routes, and domain state definition.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::routes;
pub use state::AccessState;
