//! Authentication for the OpsDeck HTTP surface
//!
//! Validates HS256 bearer tokens and exposes the authenticated principal as
//! an axum extractor that works with any state implementing
//! `FromRef<S>` for [`AuthConfig`].

mod claims;
mod config;
mod error;
mod extractors;
mod jwt;

pub use claims::PrincipalClaims;
pub use config::AuthConfig;
pub use error::AuthError;
pub use extractors::AuthPrincipal;
pub use jwt::issue_token;
