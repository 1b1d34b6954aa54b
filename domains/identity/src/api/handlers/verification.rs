//! Verification code handlers
//!
//! - POST /v1/verification/send   - Issue and deliver a code
//! - POST /v1/verification/verify - Consume a code
//! - POST /v1/verification/check  - Test a code without consuming it

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use opsdeck_common::ValidatedJson;
use opsdeck_delivery::Template;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::state::IdentityState;
use crate::domain::entities::VerificationPurpose;
use crate::error::{IdentityError, Result};

// ============================================================
// DTOs
// ============================================================

#[derive(Debug, Deserialize, Validate)]
pub struct SendCodeRequest {
    #[validate(length(min = 1, max = 320))]
    pub identifier: String,
    pub purpose: VerificationPurpose,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 1, max = 320))]
    pub identifier: String,
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    pub purpose: VerificationPurpose,
}

#[derive(Debug, Serialize)]
pub struct CheckCodeResponse {
    pub valid: bool,
}

/// Message template for a purpose
pub fn template_for(purpose: VerificationPurpose) -> Template {
    match purpose {
        VerificationPurpose::LoginCode => Template::LoginCode,
        VerificationPurpose::EmailVerification => Template::EmailVerification,
        VerificationPurpose::PhoneVerification => Template::PhoneVerification,
        VerificationPurpose::PasswordReset => Template::PasswordReset,
    }
}

// ============================================================
// Handlers
// ============================================================

/// POST /v1/verification/send
pub async fn send_code(
    State(state): State<IdentityState>,
    ValidatedJson(request): ValidatedJson<SendCodeRequest>,
) -> Result<(StatusCode, Json<SendCodeResponse>)> {
    let issued = state
        .verification
        .generate(&request.identifier, request.purpose)
        .await?;

    let data = HashMap::from([
        ("code".to_string(), issued.code.clone()),
        (
            "expires_in_minutes".to_string(),
            issued.purpose.ttl().num_minutes().to_string(),
        ),
    ]);
    let template = template_for(issued.purpose);
    let to = issued.identifier.as_str();
    let sent = if issued.identifier.is_email() {
        state.delivery.send_email(to, template, &data).await
    } else {
        state.delivery.send_sms(to, template, &data).await
    };

    let receipt = sent.map_err(|e| {
        tracing::error!(purpose = %issued.purpose, error = %e, "Verification code delivery failed");
        IdentityError::DeliveryFailed(e.to_string())
    })?;
    tracing::info!(
        purpose = %issued.purpose,
        message_id = %receipt.message_id,
        "Verification code delivered"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SendCodeResponse {
            expires_at: issued.expires_at,
        }),
    ))
}

/// POST /v1/verification/verify
pub async fn verify_code(
    State(state): State<IdentityState>,
    ValidatedJson(request): ValidatedJson<CodeRequest>,
) -> Result<StatusCode> {
    state
        .verification
        .verify_code(&request.identifier, &request.code, request.purpose)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/verification/check
pub async fn check_code(
    State(state): State<IdentityState>,
    ValidatedJson(request): ValidatedJson<CodeRequest>,
) -> Result<Json<CheckCodeResponse>> {
    let valid = state
        .verification
        .is_valid(&request.identifier, &request.code, request.purpose)
        .await?;
    Ok(Json(CheckCodeResponse { valid }))
}
