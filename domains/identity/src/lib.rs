//! Identity domain: principals, rate limiting, verification codes, login lockout

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::state::{
    PrincipalEvent, PrincipalGuardContext, PrincipalStateMachine, StateError,
};
pub use domain::validation::Identifier;
pub use error::{IdentityError, Result};

// Re-export repository types
pub use repository::{
    IdentityRepositories, LoginAttemptStore, PgLoginAttemptStore, PgPrincipalStore,
    PgRateLimiter, PgTokenStore, PrincipalStore, TokenStore,
};

// Re-export services
pub use config::IdentityConfig;
pub use services::{
    InMemoryRateLimiter, IssuedCode, LoginGuard, LoginGuardConfig, LoginOutcome,
    RateLimitBackend, RateLimitConfig, RateLimitError, RateLimiter, RateLimiterFactory,
    VerificationConfig, VerificationService,
};

// Re-export API types
pub use api::routes;
pub use api::IdentityState;
