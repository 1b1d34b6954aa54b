//! Permission endpoint integration tests
//!
//! - GET /v1/permissions/check
//! - GET /v1/permissions
//! - POST /v1/permissions
//! - DELETE /v1/permissions/{id}

use axum::http::{Method, StatusCode};
use opsdeck_access::{PermissionType, ResourceStatus};
use opsdeck_audit::AuditEventType;
use serde_json::json;
use uuid::Uuid;

use crate::common::TestApp;

/// Workspace -> client -> location, all active
struct Hierarchy {
    workspace: Uuid,
    client: Uuid,
    location: Uuid,
}

fn hierarchy(app: &TestApp) -> Hierarchy {
    let workspace = app.resources.add_workspace(ResourceStatus::Active);
    let client = app.resources.add_client(workspace, ResourceStatus::Active);
    let location = app.resources.add_location(client, ResourceStatus::Active);
    Hierarchy {
        workspace,
        client,
        location,
    }
}

fn check_uri(permission_type: &str, resource_id: Uuid) -> String {
    format!(
        "/v1/permissions/check?type={}&resource_id={}",
        permission_type, resource_id
    )
}

mod test_check {
    use super::*;

    #[tokio::test]
    async fn test_requires_authentication() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let response = app
            .send(Method::GET, &check_uri("WORKSPACE_VIEWER", h.workspace), None, None)
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_cascades_down_the_hierarchy() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let principal = Uuid::new_v4();
        app.permissions
            .grant(principal, PermissionType::WorkspaceAdmin, Some(h.workspace));

        let response = app
            .send(
                Method::GET,
                &check_uri("LOCATION_VIEWER", h.location),
                Some(principal),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["allowed"], true);

        let other_workspace = app.resources.add_workspace(ResourceStatus::Active);
        let response = app
            .send(
                Method::GET,
                &check_uri("WORKSPACE_VIEWER", other_workspace),
                Some(principal),
                None,
            )
            .await;
        assert_eq!(response.body["allowed"], false);
    }

    #[tokio::test]
    async fn test_viewer_does_not_cascade() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let principal = Uuid::new_v4();
        app.permissions
            .grant(principal, PermissionType::WorkspaceViewer, Some(h.workspace));

        for (permission_type, resource, allowed) in [
            ("WORKSPACE_VIEWER", h.workspace, true),
            ("WORKSPACE_EDITOR", h.workspace, false),
            ("CLIENT_VIEWER", h.client, false),
        ] {
            let response = app
                .send(
                    Method::GET,
                    &check_uri(permission_type, resource),
                    Some(principal),
                    None,
                )
                .await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(
                response.body["allowed"], allowed,
                "{} on {}",
                permission_type, resource
            );
        }
    }

    #[tokio::test]
    async fn test_archived_ancestor_denies_without_detail() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let principal = Uuid::new_v4();
        app.permissions
            .grant(principal, PermissionType::LocationViewer, Some(h.location));
        app.resources.set_status(h.workspace, ResourceStatus::Archived);

        let response = app
            .send(
                Method::GET,
                &check_uri("LOCATION_VIEWER", h.location),
                Some(principal),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.error_code(), Some("ACCESS_DENIED"));
        assert_eq!(response.body["error"]["message"], "Access denied");
    }
}

mod test_grant_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_grant_list_and_revoke() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let admin = Uuid::new_v4();
        let grantee = Uuid::new_v4();
        app.permissions
            .grant(admin, PermissionType::WorkspaceAdmin, Some(h.workspace));

        let response = app
            .send(
                Method::POST,
                "/v1/permissions",
                Some(admin),
                Some(json!({
                    "principal_id": grantee,
                    "permission_type": "CLIENT_VIEWER",
                    "resource_id": h.client,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body["principal_id"], grantee.to_string());
        assert_eq!(response.body["permission_type"], "CLIENT_VIEWER");
        assert_eq!(response.body["client_id"], h.client.to_string());
        assert_eq!(response.body["granted_by"], admin.to_string());
        let permission_id = response.body["id"].as_str().unwrap().to_string();

        let response = app
            .send(Method::GET, "/v1/permissions", Some(grantee), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_array().unwrap().len(), 1);

        let response = app
            .send(
                Method::DELETE,
                &format!("/v1/permissions/{}", permission_id),
                Some(admin),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let response = app
            .send(Method::GET, "/v1/permissions", Some(grantee), None)
            .await;
        assert!(response.body.as_array().unwrap().is_empty());

        assert_eq!(app.audit.count_of(AuditEventType::PermissionGranted), 1);
        assert_eq!(app.audit.count_of(AuditEventType::PermissionRevoked), 1);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_grant() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let editor = Uuid::new_v4();
        app.permissions
            .grant(editor, PermissionType::ClientEditor, Some(h.client));

        let response = app
            .send(
                Method::POST,
                "/v1/permissions",
                Some(editor),
                Some(json!({
                    "principal_id": Uuid::new_v4(),
                    "permission_type": "CLIENT_VIEWER",
                    "resource_id": h.client,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.error_code(), Some("ACCESS_DENIED"));
        assert_eq!(app.audit.count_of(AuditEventType::AccessDenied), 1);
        assert_eq!(app.permissions.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_grant_conflicts() {
        let app = TestApp::new();
        let h = hierarchy(&app);
        let admin = Uuid::new_v4();
        app.permissions
            .grant(admin, PermissionType::ClientAdmin, Some(h.client));
        let body = json!({
            "principal_id": Uuid::new_v4(),
            "permission_type": "LOCATION_EDITOR",
            "resource_id": h.location,
        });

        let first = app
            .send(Method::POST, "/v1/permissions", Some(admin), Some(body.clone()))
            .await;
        assert_eq!(first.status, StatusCode::CREATED);

        let second = app
            .send(Method::POST, "/v1/permissions", Some(admin), Some(body))
            .await;
        assert_eq!(second.status, StatusCode::CONFLICT);
        assert_eq!(second.error_code(), Some("CONFLICT"));
    }

    #[tokio::test]
    async fn test_resource_grant_without_resource_is_invalid() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/v1/permissions",
                Some(Uuid::new_v4()),
                Some(json!({
                    "principal_id": Uuid::new_v4(),
                    "permission_type": "CLIENT_VIEWER",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), Some("INVALID_GRANT"));
    }

    #[tokio::test]
    async fn test_revoke_unknown_grant_is_not_found() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::DELETE,
                &format!("/v1/permissions/{}", Uuid::new_v4()),
                Some(Uuid::new_v4()),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}

mod common;
