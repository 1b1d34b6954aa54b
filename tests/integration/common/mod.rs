//! Common test utilities and fixtures for integration tests
//!
//! Builds the full application router over the in-memory stores so the HTTP
//! surface and the security core can be exercised without a database.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode},
    Router,
};
use opsdeck_access::mock::{InMemoryPermissionStore, InMemoryResources};
use opsdeck_access::{AccessState, PermissionManager, PermissionResolver};
use opsdeck_app::SecurityCore;
use opsdeck_audit::{mock::MemoryAuditSink, AuditLog};
use opsdeck_auth::{issue_token, AuthConfig};
use opsdeck_common::{ManualClock, SharedClock};
use opsdeck_delivery::mock::MockDeliveryChannel;
use opsdeck_identity::mock::{InMemoryLoginAttemptStore, InMemoryPrincipalStore, InMemoryTokenStore};
use opsdeck_identity::{
    IdentityState, InMemoryRateLimiter, LoginGuard, LoginGuardConfig, VerificationConfig,
    VerificationService,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_only"; // pragma: allowlist secret

/// Test application wired over in-memory stores
pub struct TestApp {
    pub router: Router,
    pub core: SecurityCore,
    pub clock: ManualClock,
    pub auth: AuthConfig,
    pub audit: MemoryAuditSink,
    pub delivery: MockDeliveryChannel,
    pub permissions: InMemoryPermissionStore,
    pub resources: InMemoryResources,
    pub tokens: InMemoryTokenStore,
    pub principals: InMemoryPrincipalStore,
    pub login_attempts: InMemoryLoginAttemptStore,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let audit = MemoryAuditSink::new();
        let audit_log = AuditLog::new(
            Arc::new(audit.clone()),
            std::time::Duration::from_millis(100),
        );
        let auth = AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            issuer: Some("opsdeck-test".to_string()),
            audience: Some("authenticated".to_string()),
        };

        // Identity
        let verification_config = VerificationConfig::default();
        let login_config = LoginGuardConfig::default();
        let tokens = InMemoryTokenStore::new();
        let principals = InMemoryPrincipalStore::new();
        let login_attempts = InMemoryLoginAttemptStore::new();
        let delivery = MockDeliveryChannel::new();
        let verification = Arc::new(VerificationService::new(
            Arc::new(tokens.clone()),
            Arc::new(InMemoryRateLimiter::new(
                verification_config.rate_limit,
                shared.clone(),
            )),
            audit_log.clone(),
            shared.clone(),
            verification_config,
        ));
        let login_guard = Arc::new(LoginGuard::new(
            Arc::new(principals.clone()),
            Arc::new(login_attempts.clone()),
            Arc::new(InMemoryRateLimiter::new(login_config.throttle, shared.clone())),
            audit_log.clone(),
            shared.clone(),
            login_config,
        ));

        // Access
        let permissions = InMemoryPermissionStore::new();
        let resources = InMemoryResources::new();
        let resolver = Arc::new(PermissionResolver::new(
            Arc::new(permissions.clone()),
            resources.registry(),
            audit_log.clone(),
            shared.clone(),
        ));
        let manager = Arc::new(PermissionManager::new(
            resolver.clone(),
            Arc::new(permissions.clone()),
            audit_log,
            shared,
        ));

        let router = opsdeck_app::router(
            IdentityState {
                verification: verification.clone(),
                delivery: Arc::new(delivery.clone()),
            },
            AccessState {
                resolver: resolver.clone(),
                manager,
                auth: auth.clone(),
            },
        );

        Self {
            router,
            core: SecurityCore::new(resolver, verification, login_guard),
            clock,
            auth,
            audit,
            delivery,
            permissions,
            resources,
            tokens,
            principals,
            login_attempts,
        }
    }

    /// Bearer token for `principal_id`
    pub fn token_for(&self, principal_id: Uuid) -> String {
        issue_token(&self.auth, principal_id, None, chrono::Duration::hours(1)).unwrap()
    }

    /// Send a request through the router and decode the JSON body (Null when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        principal_id: Option<Uuid>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = principal_id {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", self.token_for(id)));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Decoded response
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `error.code` from an error envelope
    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}
