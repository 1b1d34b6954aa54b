//! Shared utilities, configuration, and error handling for OpsDeck
//!
//! This crate provides common functionality used across the access core:
//! - Configuration management following 12-factor principles
//! - Error types and the store retry policy
//! - A pluggable clock so time-dependent logic can be tested deterministically
//! - Request extractors

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;

pub use clock::{Clock, SharedClock, SystemClock};
pub use config::{env_flag, env_or, env_required};
pub use db::{with_retry, with_retry_non_idempotent, RepositoryError, RetryPolicy};
pub use error::{Error, Result};
pub use extractors::ValidatedJson;

#[cfg(any(test, feature = "test-support"))]
pub use clock::ManualClock;
