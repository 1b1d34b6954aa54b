//! Access domain state and auth integration

use std::sync::Arc;

use axum::extract::FromRef;
use opsdeck_auth::AuthConfig;

use crate::services::{PermissionManager, PermissionResolver};

/// Application state for the Access domain
#[derive(Clone)]
pub struct AccessState {
    pub resolver: Arc<PermissionResolver>,
    pub manager: Arc<PermissionManager>,
    pub auth: AuthConfig,
}

impl FromRef<AccessState> for AuthConfig {
    fn from_ref(state: &AccessState) -> Self {
        state.auth.clone()
    }
}
