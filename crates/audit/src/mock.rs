//! In-memory audit sinks for tests

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{AuditError, AuditEvent, AuditEventType, AuditSink};

/// Sink that keeps every appended event in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    delay: Option<Duration>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before each append, to exercise append deadlines
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn guard(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All events appended so far, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.guard().clone()
    }

    /// Events of a single type
    pub fn events_of(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.guard()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn count_of(&self, event_type: AuditEventType) -> usize {
        self.guard()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.guard().push(event);
        Ok(())
    }
}

/// Sink whose every append fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAuditSink;

#[async_trait::async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::Configuration(
            "failing sink rejects every event".to_string(),
        ))
    }
}
