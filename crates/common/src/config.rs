//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config. Component-specific settings
//! (rate limits, lockout, delivery) live next to the component and use the
//! helpers below.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Read a required variable
pub fn env_required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("{} is required", key))
}

/// Read and parse a variable, falling back to `default` when unset.
///
/// A value that is present but unparsable is an error rather than a silent
/// fallback.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Read a boolean flag (`true/false/1/0/yes/no`)
pub fn env_flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(anyhow!("{} has invalid boolean value {:?}", key, raw)),
        },
        Err(_) => Ok(default),
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL (PostgreSQL)
    pub database_url: String,

    /// Runtime configuration
    pub port: u16,
    pub log_format: LogFormat,

    /// Interval between expired-token / limiter sweeps
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Self {
            database_url: env_required("DATABASE_URL")?,
            port: env_or("PORT", 3000)?,
            log_format: env_or("LOG_FORMAT", LogFormat::Pretty)?,
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 300u64)?),
        })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
