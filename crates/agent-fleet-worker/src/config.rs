//! Worker configuration.

use std::{path::PathBuf, time::Duration};

use agent_fleet_core::config::{ConfigError, env_millis, env_secs, env_u64};

/// Bounds for the automatic recovery backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory the execution engine runs in.
    pub working_dir: PathBuf,
    /// Interval between approval checks while waiting for approval.
    pub approval_poll_interval: Duration,
    /// How long to wait for approval before re-registering.
    pub approval_timeout: Duration,
    /// Interval between heartbeats while connecting or ready.
    pub heartbeat_interval: Duration,
    /// Upper bound for every collaborator call.
    pub request_timeout: Duration,
    /// Interval of the periodic session sync while ready; `None` disables it.
    /// Entering ready always syncs once.
    pub sync_interval: Option<Duration>,
    /// Number of transitions kept in the history.
    pub history_capacity: usize,
    pub recovery_backoff: BackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            approval_poll_interval: Duration::from_secs(5),
            approval_timeout: Duration::from_secs(900), // 15 minutes
            heartbeat_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            sync_interval: Some(Duration::from_secs(60)),
            history_capacity: 50,
            recovery_backoff: BackoffConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from `FLEET_*` environment variables, falling back
    /// to defaults for unset ones.
    ///
    /// # Errors
    /// Returns error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let working_dir = std::env::var("FLEET_WORKING_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.working_dir);

        let sync_interval = match env_u64("FLEET_SYNC_INTERVAL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.sync_interval,
        };

        let history_capacity = env_u64("FLEET_HISTORY_CAPACITY")?
            .map(|v| {
                usize::try_from(v).map_err(|e| ConfigError::InvalidValue {
                    key: "FLEET_HISTORY_CAPACITY",
                    message: e.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(defaults.history_capacity);

        let config = Self {
            working_dir,
            approval_poll_interval: env_secs("FLEET_APPROVAL_POLL_SECS")?
                .unwrap_or(defaults.approval_poll_interval),
            approval_timeout: env_secs("FLEET_APPROVAL_TIMEOUT_SECS")?
                .unwrap_or(defaults.approval_timeout),
            heartbeat_interval: env_secs("FLEET_HEARTBEAT_INTERVAL_SECS")?
                .unwrap_or(defaults.heartbeat_interval),
            request_timeout: env_secs("FLEET_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            sync_interval,
            history_capacity,
            recovery_backoff: BackoffConfig {
                initial: env_millis("FLEET_RECOVERY_BACKOFF_INITIAL_MS")?
                    .unwrap_or(defaults.recovery_backoff.initial),
                max: env_millis("FLEET_RECOVERY_BACKOFF_MAX_MS")?
                    .unwrap_or(defaults.recovery_backoff.max),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns error if an interval is zero or the backoff bounds are inverted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("FLEET_APPROVAL_POLL_SECS", self.approval_poll_interval),
            ("FLEET_APPROVAL_TIMEOUT_SECS", self.approval_timeout),
            ("FLEET_HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval),
            ("FLEET_REQUEST_TIMEOUT_SECS", self.request_timeout),
        ];
        for (key, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.recovery_backoff.initial > self.recovery_backoff.max {
            return Err(ConfigError::InvalidValue {
                key: "FLEET_RECOVERY_BACKOFF_INITIAL_MS",
                message: "must not exceed FLEET_RECOVERY_BACKOFF_MAX_MS".to_string(),
            });
        }
        Ok(())
    }
}
