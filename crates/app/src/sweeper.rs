//! Background sweeper
//!
//! Periodically deletes expired verification codes and idle rate-limit
//! entries. Failures are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use opsdeck_identity::{RateLimiter, VerificationService};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Sweeper {
    verification: Arc<VerificationService>,
    limiters: Vec<Arc<dyn RateLimiter>>,
}

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_tokens: u64,
    pub limiter_entries: u64,
}

impl Sweeper {
    pub fn new(verification: Arc<VerificationService>, limiters: Vec<Arc<dyn RateLimiter>>) -> Self {
        Self {
            verification,
            limiters,
        }
    }

    /// Run one sweep
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.verification.cleanup_expired().await {
            Ok(removed) => report.expired_tokens = removed,
            Err(e) => tracing::warn!(error = %e, "Expired token cleanup failed"),
        }
        for limiter in &self.limiters {
            match limiter.sweep().await {
                Ok(removed) => report.limiter_entries += removed,
                Err(e) => tracing::warn!(error = %e, "Rate limiter sweep failed"),
            }
        }

        tracing::debug!(
            expired_tokens = report.expired_tokens,
            limiter_entries = report.limiter_entries,
            "Sweep finished"
        );
        report
    }

    /// Sweep every `interval` until the task is aborted
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
