//! OpsDeck Delivery
//!
//! Out-of-band delivery of verification codes with support for:
//! - AWS SES for email (LocalStack via `AWS_ENDPOINT_URL`)
//! - An HTTP SMS gateway for phone numbers
//! - A capturing mock channel for tests and local development

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opsdeck_common::config::{env_flag, env_or};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aws_ses;
pub mod content;
pub mod sms;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery configuration error: {0}")]
    Configuration(String),

    #[error("Delivery validation error: {0}")]
    Validation(String),

    #[error("AWS SES error: {0}")]
    AwsSes(String),

    #[error("SMS gateway error: {0}")]
    Sms(String),
}

/// Message template selected by verification purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    LoginCode,
    EmailVerification,
    PhoneVerification,
    PasswordReset,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::LoginCode => "login_code",
            Template::EmailVerification => "email_verification",
            Template::PhoneVerification => "phone_verification",
            Template::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template variables (`code`, `expires_in_minutes`, …)
pub type TemplateData = HashMap<String, String>;

/// Transport a message went out on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

/// Email message to be sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// SMS message to be sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Delivery receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    pub provider: String,
}

/// Delivery configuration
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Delivery provider (live, mock)
    pub provider: String,
    /// AWS region for SES
    pub aws_region: Option<String>,
    /// AWS endpoint URL (for LocalStack)
    pub aws_endpoint_url: Option<String>,
    /// Default from address
    pub default_from: String,
    /// SMS gateway endpoint accepting `{to, body}` JSON
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<String>,
    /// Enable sending (can disable for testing)
    pub enabled: bool,
    /// Base URL for the application (used in links)
    pub app_base_url: String,
}

impl DeliveryConfig {
    /// Create delivery config from environment variables
    pub fn from_env() -> Result<Self, DeliveryError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            provider: std::env::var("DELIVERY_PROVIDER").unwrap_or_else(|_| "mock".to_string()),
            aws_region: std::env::var("AWS_REGION").ok(),
            aws_endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
            default_from: env_or("FROM_EMAIL", "no-reply@opsdeck.app".to_string())
                .map_err(|e| DeliveryError::Configuration(e.to_string()))?,
            sms_gateway_url: std::env::var("SMS_GATEWAY_URL").ok(),
            sms_gateway_token: std::env::var("SMS_GATEWAY_TOKEN").ok(),
            enabled: env_flag("DELIVERY_ENABLED", true)
                .map_err(|e| DeliveryError::Configuration(e.to_string()))?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "https://opsdeck.app".to_string()),
        })
    }
}

/// Outbound channel for verification codes
#[async_trait::async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Render `template` with `data` and email it to `to`
    async fn send_email(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError>;

    /// Render `template` with `data` and text it to `to`
    async fn send_sms(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Production channel: SES for email, HTTP gateway for SMS
pub struct LiveDeliveryChannel {
    email: aws_ses::SesEmailSender,
    sms: Option<sms::HttpSmsGateway>,
    config: DeliveryConfig,
}

impl LiveDeliveryChannel {
    pub async fn new(config: DeliveryConfig) -> Result<Self, DeliveryError> {
        let email = aws_ses::SesEmailSender::new(&config).await?;
        let sms = match config.sms_gateway_url.as_deref() {
            Some(url) => Some(sms::HttpSmsGateway::new(
                url,
                config.sms_gateway_token.clone(),
            )?),
            None => {
                tracing::warn!("SMS_GATEWAY_URL not set, SMS delivery will fail");
                None
            }
        };
        Ok(Self { email, sms, config })
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for LiveDeliveryChannel {
    async fn send_email(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let rendered = content::render(template, data, &self.config.app_base_url)?;
        let message = EmailMessage {
            to: to.to_string(),
            from: self.config.default_from.clone(),
            subject: rendered.subject,
            body_text: rendered.body_text,
            body_html: Some(rendered.body_html),
        };
        self.email.send(&message).await
    }

    async fn send_sms(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let gateway = self
            .sms
            .as_ref()
            .ok_or_else(|| DeliveryError::Configuration("SMS gateway not configured".to_string()))?;
        let rendered = content::render(template, data, &self.config.app_base_url)?;
        gateway
            .send(&SmsMessage {
                to: to.to_string(),
                body: rendered.sms_text,
            })
            .await
    }
}

/// Channel used when delivery is disabled: logs and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDeliveryChannel;

impl DisabledDeliveryChannel {
    fn receipt(channel: Channel) -> DeliveryReceipt {
        DeliveryReceipt {
            message_id: format!("disabled-{}", uuid::Uuid::new_v4()),
            channel,
            sent_at: Utc::now(),
            provider: "disabled".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for DisabledDeliveryChannel {
    async fn send_email(
        &self,
        _to: &str,
        template: Template,
        _data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        tracing::warn!(template = %template, "Delivery disabled, skipping email");
        Ok(Self::receipt(Channel::Email))
    }

    async fn send_sms(
        &self,
        _to: &str,
        template: Template,
        _data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        tracing::warn!(template = %template, "Delivery disabled, skipping SMS");
        Ok(Self::receipt(Channel::Sms))
    }
}

/// Delivery channel factory
pub struct DeliveryChannelFactory;

impl DeliveryChannelFactory {
    /// Create the delivery channel based on configuration
    pub async fn create(config: DeliveryConfig) -> Result<Arc<dyn DeliveryChannel>, DeliveryError> {
        if !config.enabled {
            tracing::info!("Delivery disabled, codes will not leave the process");
            return Ok(Arc::new(DisabledDeliveryChannel));
        }

        match config.provider.as_str() {
            "live" | "ses" => {
                tracing::info!("Creating live delivery channel (SES + SMS gateway)");
                Ok(Arc::new(LiveDeliveryChannel::new(config).await?))
            }
            "mock" | "log" => {
                tracing::info!("Creating logging delivery channel");
                Ok(Arc::new(LoggingDeliveryChannel))
            }
            provider => Err(DeliveryError::Configuration(format!(
                "Unknown delivery provider: {}. Supported providers: live, mock, log",
                provider
            ))),
        }
    }
}

/// Local-development channel that writes the rendered message to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeliveryChannel;

#[async_trait::async_trait]
impl DeliveryChannel for LoggingDeliveryChannel {
    async fn send_email(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let rendered = content::render(template, data, "http://localhost:3000")?;
        tracing::info!(to = %to, template = %template, subject = %rendered.subject, "Email delivery (local)");
        Ok(DeliveryReceipt {
            message_id: format!("local-{}", uuid::Uuid::new_v4()),
            channel: Channel::Email,
            sent_at: Utc::now(),
            provider: "local".to_string(),
        })
    }

    async fn send_sms(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        content::render(template, data, "http://localhost:3000")?;
        tracing::info!(to = %to, template = %template, "SMS delivery (local)");
        Ok(DeliveryReceipt {
            message_id: format!("local-{}", uuid::Uuid::new_v4()),
            channel: Channel::Sms,
            sent_at: Utc::now(),
            provider: "local".to_string(),
        })
    }
}
