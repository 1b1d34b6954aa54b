//! OpsDeck application composition root
//!
//! Builds the access and identity services from configuration and composes
//! the domain routers into a single application.

pub mod core;
pub mod sweeper;

use std::sync::Arc;

use axum::Router;
use opsdeck_access::{
    AccessState, PermissionManager, PermissionResolver, PgPermissionStore, ResourceRegistry,
};
use opsdeck_audit::{AuditConfig, AuditLog, AuditSinkFactory};
use opsdeck_auth::AuthConfig;
use opsdeck_common::{config::Config, RetryPolicy, SharedClock, SystemClock};
use opsdeck_delivery::{DeliveryChannelFactory, DeliveryConfig};
use opsdeck_identity::{
    IdentityConfig, IdentityRepositories, IdentityState, LoginGuard, RateLimiterFactory,
    VerificationService,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

pub use crate::core::SecurityCore;
pub use crate::sweeper::{SweepReport, Sweeper};

/// Everything the server needs after startup
pub struct Application {
    pub router: Router,
    pub core: SecurityCore,
    pub sweeper: Sweeper,
}

/// Compose the domain routers with shared infrastructure routes
pub fn router(identity: IdentityState, access: AccessState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(opsdeck_identity::routes().with_state(identity))
        .merge(opsdeck_access::routes().with_state(access))
        .layer(TraceLayer::new_for_http())
}

/// Build every service from the environment and wire the application
pub async fn create_app(config: &Config, pool: PgPool) -> Result<Application, anyhow::Error> {
    let clock: SharedClock = Arc::new(SystemClock);
    let retry = RetryPolicy::from_env()?;
    let auth_config = AuthConfig::from_env()?;
    let identity_config = IdentityConfig::from_env()?;

    let audit_config = AuditConfig::from_env()?;
    let audit = AuditLog::new(
        AuditSinkFactory::create(&audit_config, pool.clone(), retry),
        audit_config.append_timeout,
    );

    let delivery = DeliveryChannelFactory::create(DeliveryConfig::from_env()?).await?;

    // Identity
    let repos = IdentityRepositories::new(pool.clone(), retry);
    let verification_limiter = RateLimiterFactory::create(
        identity_config.rate_limit_backend,
        "verification",
        identity_config.verification.rate_limit,
        clock.clone(),
        &pool,
        retry,
    );
    let login_limiter = RateLimiterFactory::create(
        identity_config.rate_limit_backend,
        "login",
        identity_config.login.throttle,
        clock.clone(),
        &pool,
        retry,
    );
    let verification = Arc::new(VerificationService::new(
        repos.tokens.clone(),
        verification_limiter.clone(),
        audit.clone(),
        clock.clone(),
        identity_config.verification,
    ));
    let login_guard = Arc::new(LoginGuard::new(
        repos.principals.clone(),
        repos.login_attempts.clone(),
        login_limiter.clone(),
        audit.clone(),
        clock.clone(),
        identity_config.login,
    ));

    // Access
    let permissions = Arc::new(PgPermissionStore::new(pool.clone(), retry));
    let resolver = Arc::new(PermissionResolver::new(
        permissions.clone(),
        ResourceRegistry::postgres(pool, retry),
        audit.clone(),
        clock.clone(),
    ));
    let manager = Arc::new(PermissionManager::new(
        resolver.clone(),
        permissions,
        audit,
        clock,
    ));

    tracing::info!(
        rate_limit_backend = ?identity_config.rate_limit_backend,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Access core services initialised"
    );

    let router = router(
        IdentityState {
            verification: verification.clone(),
            delivery,
        },
        AccessState {
            resolver: resolver.clone(),
            manager,
            auth: auth_config,
        },
    );

    Ok(Application {
        router,
        core: SecurityCore::new(resolver, verification.clone(), login_guard),
        sweeper: Sweeper::new(verification, vec![verification_limiter, login_limiter]),
    })
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
