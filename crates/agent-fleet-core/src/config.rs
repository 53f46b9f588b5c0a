//! Environment parsing shared by the worker and sweeper configurations.

use std::time::Duration;

use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}

/// Parse a non-negative integer read from `key`.
///
/// # Errors
/// Returns [`ConfigError::InvalidValue`] naming `key` if `raw` is not a `u64`.
pub fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(key, format!("{raw:?}: {e}")))
}

/// Read `key` as a `u64`; `None` when unset.
///
/// # Errors
/// Returns error if the variable is set to something other than a `u64`.
pub fn env_u64(key: &'static str) -> Result<Option<u64>, ConfigError> {
    std::env::var(key)
        .ok()
        .map(|raw| parse_u64(key, &raw))
        .transpose()
}

/// Read `key` as whole seconds.
///
/// # Errors
/// See [`env_u64`].
pub fn env_secs(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_u64(key)?.map(Duration::from_secs))
}

/// Read `key` as milliseconds.
///
/// # Errors
/// See [`env_u64`].
pub fn env_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_u64(key)?.map(Duration::from_millis))
}
