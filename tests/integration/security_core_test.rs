//! Security core integration tests
//!
//! Drives the query surface the rest of the dashboard calls: permission
//! checks, verification codes and login bookkeeping, all sharing one audit
//! trail.

use opsdeck_access::{AccessError, PermissionType, ResourceStatus};
use opsdeck_audit::AuditEventType;
use opsdeck_common::Clock;
use opsdeck_identity::{
    IdentityError, LoginMethod, LoginOutcome, Principal, VerificationPurpose,
};
use uuid::Uuid;

use crate::common::TestApp;

fn seed_principal(app: &TestApp) -> Uuid {
    let principal = Principal::new(Some("ops@example.com".to_string()), app.clock.now());
    let id = principal.id;
    app.principals.insert(principal);
    id
}

mod test_permissions {
    use super::*;

    #[tokio::test]
    async fn test_require_permission_denies_and_audits() {
        let app = TestApp::new();
        let workspace = app.resources.add_workspace(ResourceStatus::Active);
        let client = app.resources.add_client(workspace, ResourceStatus::Active);
        let principal = Uuid::new_v4();
        app.permissions
            .grant(principal, PermissionType::ClientEditor, Some(client));

        assert!(app
            .core
            .require_permission(principal, PermissionType::ClientViewer, Some(client))
            .await
            .is_ok());

        let result = app
            .core
            .require_permission(principal, PermissionType::ClientAdmin, Some(client))
            .await;
        assert!(matches!(result, Err(AccessError::PermissionDenied { .. })));

        let denied = app.audit.events_of(AuditEventType::AccessDenied);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].principal_id, Some(principal));
    }

    #[tokio::test]
    async fn test_platform_grant_does_not_reach_resources() {
        let app = TestApp::new();
        let workspace = app.resources.add_workspace(ResourceStatus::Active);
        let principal = Uuid::new_v4();
        app.permissions
            .grant(principal, PermissionType::PlatformAdmin, None);

        assert!(app
            .core
            .has_permission(principal, PermissionType::PlatformViewer, None)
            .await
            .unwrap());
        assert!(!app
            .core
            .has_permission(principal, PermissionType::WorkspaceViewer, Some(workspace))
            .await
            .unwrap());
    }
}

mod test_verification {
    use super::*;

    #[tokio::test]
    async fn test_generated_code_verifies_through_core() {
        let app = TestApp::new();
        let issued = app
            .core
            .generate_verification("OPS@example.com", VerificationPurpose::PasswordReset)
            .await
            .unwrap();
        assert_eq!(issued.identifier.as_str(), "ops@example.com");

        // Wrong purpose does not match
        assert!(!app
            .core
            .verify_code("ops@example.com", &issued.code, VerificationPurpose::LoginCode)
            .await
            .unwrap());
        assert!(app
            .core
            .verify_code("ops@example.com", &issued.code, VerificationPurpose::PasswordReset)
            .await
            .unwrap());
        assert_eq!(app.audit.count_of(AuditEventType::VerificationIssued), 1);
    }
}

mod test_login {
    use super::*;

    #[tokio::test]
    async fn test_fifth_failure_locks_until_lockout_lapses() {
        let app = TestApp::new();
        let principal = seed_principal(&app);

        for remaining in (1..=4).rev() {
            let outcome = app
                .core
                .record_login_attempt(principal, false, LoginMethod::Password)
                .await
                .unwrap();
            assert_eq!(
                outcome,
                LoginOutcome::Failed {
                    remaining_attempts: remaining
                }
            );
        }

        let outcome = app
            .core
            .record_login_attempt(principal, false, LoginMethod::Password)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::LockedOut { .. }));
        assert!(app.core.is_locked(principal).await.unwrap());

        // Correct credentials are still refused while locked
        let result = app
            .core
            .record_login_attempt(principal, true, LoginMethod::Password)
            .await;
        assert!(matches!(result, Err(IdentityError::AccountLocked { .. })));

        app.clock.advance(chrono::Duration::minutes(16));
        assert!(!app.core.is_locked(principal).await.unwrap());
        assert_eq!(
            app.core
                .record_login_attempt(principal, true, LoginMethod::Password)
                .await
                .unwrap(),
            LoginOutcome::Succeeded
        );

        assert_eq!(app.login_attempts.len(), 7);
        assert_eq!(app.audit.count_of(AuditEventType::LoginBlocked), 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let app = TestApp::new();
        let principal = seed_principal(&app);

        for _ in 0..4 {
            app.core
                .record_login_attempt(principal, false, LoginMethod::VerificationCode)
                .await
                .unwrap();
        }
        app.core
            .record_login_attempt(principal, true, LoginMethod::VerificationCode)
            .await
            .unwrap();

        let outcome = app
            .core
            .record_login_attempt(principal, false, LoginMethod::VerificationCode)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::Failed {
                remaining_attempts: 4
            }
        );
    }

    #[tokio::test]
    async fn test_login_throttle_blocks_eleventh_attempt_in_window() {
        let app = TestApp::new();

        for _ in 0..10 {
            app.core.throttle_login("Ops@Example.com").await.unwrap();
        }
        let result = app.core.throttle_login("ops@example.com").await;
        assert!(matches!(
            result,
            Err(IdentityError::TooManyAttempts {
                retry_after_seconds: 600
            })
        ));
        assert_eq!(app.audit.count_of(AuditEventType::LoginBlocked), 1);

        // Separate identifiers have separate budgets
        assert!(app.core.throttle_login("other@example.com").await.is_ok());

        app.clock.advance(chrono::Duration::seconds(601));
        assert!(app.core.throttle_login("ops@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_throttle_rejects_malformed_identifier() {
        let app = TestApp::new();
        let result = app.core.throttle_login("not an address").await;
        assert!(matches!(result, Err(IdentityError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_unknown_principal() {
        let app = TestApp::new();
        let result = app
            .core
            .record_login_attempt(Uuid::new_v4(), false, LoginMethod::Sso)
            .await;
        assert!(matches!(result, Err(IdentityError::PrincipalNotFound)));
    }
}

mod common;
