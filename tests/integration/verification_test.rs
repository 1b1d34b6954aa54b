//! Verification code endpoint integration tests
//!
//! - POST /v1/verification/send
//! - POST /v1/verification/verify
//! - POST /v1/verification/check

use axum::http::{header::RETRY_AFTER, Method, StatusCode};
use opsdeck_audit::AuditEventType;
use opsdeck_delivery::Channel;
use serde_json::{json, Value};

use crate::common::TestApp;

fn send_body(identifier: &str) -> Value {
    json!({ "identifier": identifier, "purpose": "login_code" })
}

fn code_body(identifier: &str, code: &str) -> Value {
    json!({ "identifier": identifier, "code": code, "purpose": "login_code" })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let response = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
}

mod test_send_and_verify {
    use super::*;

    #[tokio::test]
    async fn test_delivered_code_verifies_once() {
        let app = TestApp::new();

        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("  Ops@Example.com ")),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert!(response.body["expires_at"].is_string());

        // Delivered to the normalised address
        let code = app.delivery.latest_code_for("ops@example.com").unwrap();
        assert_eq!(code.len(), 6);

        let response = app
            .send(
                Method::POST,
                "/v1/verification/verify",
                None,
                Some(code_body("ops@example.com", &code)),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let response = app
            .send(
                Method::POST,
                "/v1/verification/verify",
                None,
                Some(code_body("ops@example.com", &code)),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), Some("VERIFICATION_FAILED"));

        assert_eq!(app.audit.count_of(AuditEventType::VerificationSucceeded), 1);
        assert!(app.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_check_does_not_consume() {
        let app = TestApp::new();
        app.send(
            Method::POST,
            "/v1/verification/send",
            None,
            Some(send_body("ops@example.com")),
        )
        .await;
        let code = app.delivery.latest_code_for("ops@example.com").unwrap();

        let response = app
            .send(
                Method::POST,
                "/v1/verification/check",
                None,
                Some(code_body("ops@example.com", &code)),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["valid"], true);
        assert_eq!(app.tokens.len(), 1);

        let response = app
            .send(
                Method::POST,
                "/v1/verification/verify",
                None,
                Some(code_body("ops@example.com", &code)),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_phone_identifier_goes_out_by_sms() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("+1 555-123-4567")),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);

        let messages = app.delivery.messages_for("+15551234567");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, Channel::Sms);
    }

    #[tokio::test]
    async fn test_expired_code_is_gone() {
        let app = TestApp::new();
        app.send(
            Method::POST,
            "/v1/verification/send",
            None,
            Some(send_body("ops@example.com")),
        )
        .await;
        let code = app.delivery.latest_code_for("ops@example.com").unwrap();

        app.clock.advance(chrono::Duration::minutes(11));

        let response = app
            .send(
                Method::POST,
                "/v1/verification/verify",
                None,
                Some(code_body("ops@example.com", &code)),
            )
            .await;
        assert_eq!(response.status, StatusCode::GONE);
        assert_eq!(response.error_code(), Some("TOKEN_EXPIRED"));
    }
}

mod test_rejections {
    use super::*;

    #[tokio::test]
    async fn test_fourth_request_in_window_is_rate_limited() {
        let app = TestApp::new();
        for _ in 0..3 {
            let response = app
                .send(
                    Method::POST,
                    "/v1/verification/send",
                    None,
                    Some(send_body("ops@example.com")),
                )
                .await;
            assert_eq!(response.status, StatusCode::ACCEPTED);
        }

        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("ops@example.com")),
            )
            .await;
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.error_code(), Some("TOO_MANY_ATTEMPTS"));
        assert_eq!(response.body["error"]["retry_after_seconds"], 60);
        assert_eq!(response.headers.get(RETRY_AFTER).unwrap(), "60");
        assert_eq!(app.delivery.message_count(), 3);
        assert_eq!(app.audit.count_of(AuditEventType::VerificationRateLimited), 1);

        // Other identifiers are unaffected
        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("other@example.com")),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);

        app.clock.advance(chrono::Duration::seconds(61));
        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("ops@example.com")),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_malformed_identifier_rejected() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("not an address")),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), Some("INVALID_IDENTIFIER"));
        assert_eq!(app.delivery.message_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_surfaces_as_bad_gateway() {
        let app = TestApp::new();
        app.delivery.set_failing(true);

        let response = app
            .send(
                Method::POST,
                "/v1/verification/send",
                None,
                Some(send_body("ops@example.com")),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.error_code(), Some("DELIVERY_FAILED"));
    }
}

mod common;
