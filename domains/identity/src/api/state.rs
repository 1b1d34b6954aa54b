//! Identity domain state

use std::sync::Arc;

use opsdeck_delivery::DeliveryChannel;

use crate::services::VerificationService;

/// Application state for the Identity domain
#[derive(Clone)]
pub struct IdentityState {
    pub verification: Arc<VerificationService>,
    pub delivery: Arc<dyn DeliveryChannel>,
}
