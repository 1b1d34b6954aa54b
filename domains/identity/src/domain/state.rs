//! Principal status state machine
//!
//! ```text
//! ACTIVE --lockout_triggered--> LOCKED --lockout_expired--> ACTIVE
//! ACTIVE | LOCKED --disable--> DISABLED (terminal)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::PrincipalStatus;

/// Errors that can occur during state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition: cannot transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard condition failed: {0}")]
    GuardFailed(String),

    #[error("Terminal state: {0} is a terminal state and cannot transition")]
    TerminalState(String),
}

impl PrincipalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [PrincipalStatus] {
        match self {
            Self::Active => &[Self::Active, Self::Locked, Self::Disabled],
            Self::Locked => &[Self::Active, Self::Disabled],
            Self::Disabled => &[],
        }
    }
}

/// Events that move a principal between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalEvent {
    /// Authentication succeeded
    LoginSucceeded,
    /// Failure counter reached the threshold
    LockoutTriggered,
    /// Lockout window elapsed and the next attempt arrived
    LockoutExpired,
    /// Administrative disablement
    Disable,
}

impl std::fmt::Display for PrincipalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoginSucceeded => write!(f, "login_succeeded"),
            Self::LockoutTriggered => write!(f, "lockout_triggered"),
            Self::LockoutExpired => write!(f, "lockout_expired"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

/// Guard context for principal transitions
#[derive(Debug, Clone, Copy)]
pub struct PrincipalGuardContext {
    /// `lockout_until` is set and no longer in the future
    pub lockout_elapsed: bool,
}

/// Principal status state machine
pub struct PrincipalStateMachine;

impl PrincipalStateMachine {
    /// Attempt a state transition with guard conditions
    pub fn transition(
        current: PrincipalStatus,
        event: PrincipalEvent,
        context: Option<&PrincipalGuardContext>,
    ) -> Result<PrincipalStatus, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (current, event) {
            (PrincipalStatus::Active, PrincipalEvent::LoginSucceeded) => PrincipalStatus::Active,
            (PrincipalStatus::Active, PrincipalEvent::LockoutTriggered) => PrincipalStatus::Locked,
            (PrincipalStatus::Locked, PrincipalEvent::LockoutExpired) => {
                let elapsed = context.is_some_and(|ctx| ctx.lockout_elapsed);
                if !elapsed {
                    return Err(StateError::GuardFailed(
                        "Lockout has not elapsed yet".to_string(),
                    ));
                }
                PrincipalStatus::Active
            }
            (_, PrincipalEvent::Disable) => PrincipalStatus::Disabled,
            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(
        current: PrincipalStatus,
        event: &PrincipalEvent,
        context: Option<&PrincipalGuardContext>,
    ) -> bool {
        Self::transition(current, *event, context).is_ok()
    }
}
