//! Authorization query surface
//!
//! [`SecurityCore`] is the one handle the rest of the dashboard uses for
//! permission checks, verification codes and login bookkeeping.

use std::sync::Arc;

use opsdeck_access::{AccessError, PermissionResolver, PermissionType};
use opsdeck_identity::{
    IdentityError, IssuedCode, LoginGuard, LoginMethod, LoginOutcome, VerificationPurpose,
    VerificationService,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct SecurityCore {
    resolver: Arc<PermissionResolver>,
    verification: Arc<VerificationService>,
    login_guard: Arc<LoginGuard>,
}

impl SecurityCore {
    pub fn new(
        resolver: Arc<PermissionResolver>,
        verification: Arc<VerificationService>,
        login_guard: Arc<LoginGuard>,
    ) -> Self {
        Self {
            resolver,
            verification,
            login_guard,
        }
    }

    pub async fn has_permission(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<bool, AccessError> {
        self.resolver
            .has_permission(principal_id, permission_type, resource_id)
            .await
    }

    pub async fn require_permission(
        &self,
        principal_id: Uuid,
        permission_type: PermissionType,
        resource_id: Option<Uuid>,
    ) -> Result<(), AccessError> {
        self.resolver
            .require_permission(principal_id, permission_type, resource_id)
            .await
    }

    pub async fn generate_verification(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> Result<IssuedCode, IdentityError> {
        self.verification.generate(identifier, purpose).await
    }

    /// Consumes the code on success
    pub async fn verify_code(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<bool, IdentityError> {
        self.verification.verify(identifier, code, purpose).await
    }

    /// Call before checking credentials for a raw login identifier; fails
    /// with `TooManyAttempts` once the identifier's window budget is spent.
    pub async fn throttle_login(&self, identifier: &str) -> Result<(), IdentityError> {
        self.login_guard.throttle(identifier).await
    }

    pub async fn record_login_attempt(
        &self,
        principal_id: Uuid,
        succeeded: bool,
        method: LoginMethod,
    ) -> Result<LoginOutcome, IdentityError> {
        self.login_guard
            .record_attempt(principal_id, succeeded, method)
            .await
    }

    pub async fn is_locked(&self, principal_id: Uuid) -> Result<bool, IdentityError> {
        self.login_guard.is_locked(principal_id).await
    }
}
