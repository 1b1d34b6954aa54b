//! Identity configuration loaded from the environment

use anyhow::{bail, Result};
use chrono::Duration;
use opsdeck_common::{env_flag, env_or};

use crate::services::{LoginGuardConfig, RateLimitBackend, RateLimitConfig, VerificationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentityConfig {
    pub rate_limit_backend: RateLimitBackend,
    pub verification: VerificationConfig,
    pub login: LoginGuardConfig,
}

fn rate_limit_from_env(prefix: &str, defaults: RateLimitConfig) -> Result<RateLimitConfig> {
    let max_attempts = env_or(&format!("{}_MAX", prefix), defaults.max_attempts)?;
    let window_secs = env_or(
        &format!("{}_WINDOW_SECS", prefix),
        defaults.window.num_seconds(),
    )?;
    if max_attempts == 0 || window_secs <= 0 {
        bail!("{}_MAX and {}_WINDOW_SECS must be positive", prefix, prefix);
    }
    Ok(RateLimitConfig {
        max_attempts,
        window: Duration::seconds(window_secs),
    })
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self> {
        let verification_defaults = VerificationConfig::default();
        let login_defaults = LoginGuardConfig::default();

        let code_digits = env_or("VERIFICATION_CODE_DIGITS", verification_defaults.code_digits)?;
        if !VerificationConfig::CODE_DIGITS.contains(&code_digits) {
            bail!("VERIFICATION_CODE_DIGITS must be between 4 and 9, got {}", code_digits);
        }

        let max_attempts = env_or("LOGIN_MAX_ATTEMPTS", login_defaults.max_attempts)?;
        let lockout_minutes = env_or(
            "LOGIN_LOCKOUT_MINUTES",
            login_defaults.lockout_duration.num_minutes(),
        )?;
        if max_attempts < 1 || lockout_minutes < 1 {
            bail!("LOGIN_MAX_ATTEMPTS and LOGIN_LOCKOUT_MINUTES must be positive");
        }

        Ok(Self {
            rate_limit_backend: env_or("RATE_LIMIT_BACKEND", RateLimitBackend::default())?,
            verification: VerificationConfig {
                code_digits,
                replace_previous: env_flag(
                    "VERIFICATION_REPLACE_PREVIOUS",
                    verification_defaults.replace_previous,
                )?,
                rate_limit: rate_limit_from_env(
                    "VERIFICATION_RATE_LIMIT",
                    verification_defaults.rate_limit,
                )?,
            },
            login: LoginGuardConfig {
                max_attempts,
                lockout_duration: Duration::minutes(lockout_minutes),
                throttle: rate_limit_from_env("LOGIN_RATE_LIMIT", login_defaults.throttle)?,
            },
        })
    }
}
