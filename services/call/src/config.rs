use secrecy::SecretString;
use skin_doctor_core::{
    cooldown::{DEFAULT_COOLDOWN_WINDOW, DEFAULT_SETTLE_DELAY},
    provisioning::{DEFAULT_API_BASE, DEFAULT_REPLICA_ID},
    tools::UnknownConditionPolicy,
};
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds the settings of a call session.
///
/// Only the API credential and the log level come from the environment; everything
/// else is a compiled default that callers may override in code.
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub api_base: String,
    pub replica_id: String,
    pub display_name: String,
    pub cooldown_window: Duration,
    pub settle_delay: Duration,
    pub unknown_condition: UnknownConditionPolicy,
    pub log_level: Level,
}

impl Config {
    /// Builds a configuration with every default in place.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            replica_id: DEFAULT_REPLICA_ID.to_string(),
            display_name: "You".to_string(),
            cooldown_window: DEFAULT_COOLDOWN_WINDOW,
            settle_delay: DEFAULT_SETTLE_DELAY,
            unknown_condition: UnknownConditionPolicy::default(),
            log_level: Level::INFO,
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = std::env::var("TAVUS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("TAVUS_API_KEY".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            log_level,
            ..Self::new(SecretString::from(api_key))
        })
    }
}
