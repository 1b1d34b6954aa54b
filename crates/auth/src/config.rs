//! Authentication configuration

use opsdeck_common::config::env_required;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    /// Load from `JWT_SECRET` (required), `JWT_ISSUER`, `JWT_AUDIENCE`
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            jwt_secret: env_required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").ok().filter(|v| !v.is_empty()),
            audience: std::env::var("JWT_AUDIENCE").ok().filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_requires_secret() {
        std::env::remove_var("JWT_SECRET");
        assert!(AuthConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_treats_empty_issuer_as_unset() {
        std::env::set_var("JWT_SECRET", "s3cret");
        std::env::set_var("JWT_ISSUER", "");
        std::env::remove_var("JWT_AUDIENCE");

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
        assert!(config.issuer.is_none());
        assert!(config.audience.is_none());

        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("JWT_ISSUER");
    }
}
