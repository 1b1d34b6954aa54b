//! AWS SES email sender
//!
//! Production email delivery through AWS Simple Email Service (SES), with
//! LocalStack support through `AWS_ENDPOINT_URL`.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_ses::config::SharedCredentialsProvider;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use aws_sdk_ses::Client as SesClient;
use chrono::Utc;

use crate::{Channel, DeliveryConfig, DeliveryError, DeliveryReceipt, EmailMessage};

/// Sends rendered emails through SES
pub struct SesEmailSender {
    client: SesClient,
}

impl SesEmailSender {
    pub async fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let region = config
            .aws_region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let aws_config = match config.aws_endpoint_url.as_ref() {
            Some(endpoint_url) => {
                tracing::info!(endpoint_url = %endpoint_url, "Using custom AWS endpoint");

                // LocalStack accepts any static credentials
                let credentials = Credentials::new(
                    "test-access-key",
                    "test-secret-key",
                    None,
                    None,
                    "localstack-delivery-provider",
                );

                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .endpoint_url(endpoint_url)
                    .credentials_provider(SharedCredentialsProvider::new(credentials))
                    .load()
                    .await
            }
            None => {
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .load()
                    .await
            }
        };

        Ok(Self {
            client: SesClient::new(&aws_config),
        })
    }

    fn build_ses_message(message: &EmailMessage) -> Result<Message, DeliveryError> {
        let content = |data: &str, part: &str| {
            Content::builder()
                .data(data)
                .charset("UTF-8")
                .build()
                .map_err(|e| DeliveryError::AwsSes(format!("Failed to build {}: {}", part, e)))
        };

        let mut body_builder = Body::builder().text(content(&message.body_text, "text body")?);
        if let Some(html_body) = &message.body_html {
            body_builder = body_builder.html(content(html_body, "HTML body")?);
        }

        Ok(Message::builder()
            .subject(content(&message.subject, "subject")?)
            .body(body_builder.build())
            .build())
    }

    /// Send one message
    pub async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if !message.to.contains('@') || !message.from.contains('@') {
            return Err(DeliveryError::Validation(
                "Invalid email address format".to_string(),
            ));
        }

        let ses_message = Self::build_ses_message(message)?;
        let destination = Destination::builder().to_addresses(&message.to).build();

        let result = self
            .client
            .send_email()
            .source(&message.from)
            .destination(destination)
            .message(ses_message)
            .send()
            .await
            .map_err(|e| DeliveryError::AwsSes(format!("Failed to send email: {}", e)))?;

        let message_id = result.message_id().to_string();
        tracing::info!(message_id = %message_id, "Email sent via SES");

        Ok(DeliveryReceipt {
            message_id,
            channel: Channel::Email,
            sent_at: Utc::now(),
            provider: "aws-ses".to_string(),
        })
    }
}
