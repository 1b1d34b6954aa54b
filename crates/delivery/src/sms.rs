//! HTTP SMS gateway client
//!
//! POSTs `{"to": …, "body": …}` to the configured gateway URL with an
//! optional bearer token.

use chrono::Utc;
use serde::Deserialize;

use crate::{Channel, DeliveryError, DeliveryReceipt, SmsMessage};

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    id: Option<String>,
}

/// SMS gateway reached over HTTPS
pub struct HttpSmsGateway {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(url: &str, token: Option<String>) -> Result<Self, DeliveryError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DeliveryError::Configuration(format!(
                "SMS gateway URL must be http(s): {}",
                url
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn send(&self, message: &SmsMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if !message.to.starts_with('+') {
            return Err(DeliveryError::Validation(
                "SMS recipient must be in E.164 format".to_string(),
            ));
        }

        let mut request = self.http.post(&self.url).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Sms(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            return Err(DeliveryError::Sms(format!(
                "SMS gateway returned {}: {}",
                status, body
            )));
        }

        let parsed: GatewayResponse = response
            .json()
            .await
            .unwrap_or(GatewayResponse { id: None });
        let message_id = parsed
            .id
            .unwrap_or_else(|| format!("sms-{}", uuid::Uuid::new_v4()));

        tracing::debug!(message_id = %message_id, "SMS accepted by gateway");

        Ok(DeliveryReceipt {
            message_id,
            channel: Channel::Sms,
            sent_at: Utc::now(),
            provider: "http-sms".to_string(),
        })
    }
}
