//! Tracing sink and the best-effort audit log wrapper

use std::sync::Arc;
use std::time::Duration;

use crate::{AuditError, AuditEvent, AuditSink, Severity};

/// Sink that emits every event as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        let principal_id = event.principal_id.map(|id| id.to_string());
        macro_rules! emit {
            ($level:ident) => {
                tracing::$level!(
                    target: "audit",
                    event_type = %event.event_type,
                    severity = %event.severity,
                    principal_id = principal_id.as_deref(),
                    resource_type = event.resource_type.as_deref(),
                    resource_id = event.resource_id.as_deref(),
                    metadata = %event.metadata,
                    timestamp = %event.timestamp,
                    "{}",
                    event.description
                )
            };
        }
        match event.severity {
            Severity::Info => emit!(info),
            Severity::Warning => emit!(warn),
            Severity::Alert => emit!(error),
        }
        Ok(())
    }
}

/// Best-effort handle components write audit events through.
///
/// Appends are awaited in sequence with the caller's work but bounded by
/// `append_timeout`; failures are logged and dropped.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    append_timeout: Duration,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("append_timeout", &self.append_timeout)
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>, append_timeout: Duration) -> Self {
        Self {
            sink,
            append_timeout,
        }
    }

    /// Audit log that only writes structured log lines
    pub fn tracing_only() -> Self {
        Self::new(Arc::new(TracingAuditSink), Duration::from_millis(250))
    }

    /// Append an event, swallowing any sink failure
    pub async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type;
        let outcome = match tokio::time::timeout(self.append_timeout, self.sink.append(event)).await
        {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout(self.append_timeout)),
        };

        if let Err(e) = outcome {
            tracing::error!(
                event_type = %event_type,
                error = %e,
                "Failed to append audit event"
            );
        }
    }
}
