//! JWT claims types

use serde::{Deserialize, Serialize};

/// Claims carried by an OpsDeck access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalClaims {
    /// Subject (principal ID)
    pub sub: String,
    /// Email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issued at
    pub iat: u64,
    /// Expires at
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}
