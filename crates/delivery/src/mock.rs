//! Mock delivery channel
//!
//! Captures rendered messages in memory so tests can read back the code a
//! user would have received.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::content::render;
use crate::{Channel, DeliveryChannel, DeliveryError, DeliveryReceipt, Template, TemplateData};

lazy_static! {
    static ref CODE_PATTERN: Regex = Regex::new(r"\b(\d{4,10})\b").unwrap();
}

/// Message captured by the mock channel
#[derive(Debug, Clone)]
pub struct CapturedMessage {
    pub channel: Channel,
    pub to: String,
    pub template: Template,
    pub subject: Option<String>,
    pub body: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedMessage {
    /// First run of digits in the body
    pub fn extract_code(&self) -> Option<String> {
        CODE_PATTERN
            .captures(&self.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Mock delivery channel for testing
#[derive(Debug, Clone, Default)]
pub struct MockDeliveryChannel {
    messages: Arc<Mutex<Vec<CapturedMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MockDeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<CapturedMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent send fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<CapturedMessage> {
        self.guard().clone()
    }

    pub fn messages_for(&self, to: &str) -> Vec<CapturedMessage> {
        self.guard().iter().filter(|m| m.to == to).cloned().collect()
    }

    /// Code from the most recent message sent to `to`
    pub fn latest_code_for(&self, to: &str) -> Option<String> {
        self.guard()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(CapturedMessage::extract_code)
    }

    pub fn message_count(&self) -> usize {
        self.guard().len()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    fn capture(
        &self,
        channel: Channel,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Sms("mock channel set to fail".to_string()));
        }

        let rendered = render(template, data, "https://opsdeck.test")?;
        let (subject, body) = match channel {
            Channel::Email => (Some(rendered.subject), rendered.body_text),
            Channel::Sms => (None, rendered.sms_text),
        };

        let now = Utc::now();
        self.guard().push(CapturedMessage {
            channel,
            to: to.to_string(),
            template,
            subject,
            body,
            captured_at: now,
        });

        tracing::debug!(to = %to, template = %template, "Mock channel captured message");

        Ok(DeliveryReceipt {
            message_id: format!("mock-{}", uuid::Uuid::new_v4()),
            channel,
            sent_at: now,
            provider: "mock".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for MockDeliveryChannel {
    async fn send_email(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.capture(Channel::Email, to, template, data)
    }

    async fn send_sms(
        &self,
        to: &str,
        template: Template,
        data: &TemplateData,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.capture(Channel::Sms, to, template, data)
    }
}
