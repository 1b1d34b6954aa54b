//! Identity services

pub mod login_guard;
pub mod rate_limit;
pub mod verification;

pub use login_guard::{LoginGuard, LoginGuardConfig, LoginOutcome};
pub use rate_limit::{
    InMemoryRateLimiter, RateLimitBackend, RateLimitConfig, RateLimitEntry, RateLimitError,
    RateLimiter, RateLimiterFactory,
};
pub use verification::{IssuedCode, VerificationConfig, VerificationService};
