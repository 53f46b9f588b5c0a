//! Staleness sweep configuration.

use std::time::Duration;

use agent_fleet_core::config::{ConfigError, env_secs, env_u64};

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval at which workers send heartbeats.
    pub heartbeat_interval: Duration,
    /// Staleness threshold as a multiple of `heartbeat_interval`.
    pub staleness_multiplier: u32,
    /// Extra slack added to the threshold to absorb clock skew and pauses.
    pub grace: Duration,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            staleness_multiplier: 3,
            grace: Duration::ZERO,
            sweep_interval: Duration::from_secs(120), // 2 minutes
        }
    }
}

impl SweepConfig {
    /// Load configuration from `FLEET_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is set but not a valid non-negative integer,
    /// or if the heartbeat interval or multiplier is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            heartbeat_interval: env_secs("FLEET_HEARTBEAT_INTERVAL_SECS")?
                .unwrap_or(defaults.heartbeat_interval),
            staleness_multiplier: env_u64("FLEET_STALENESS_MULTIPLIER")?
                .map(|v| {
                    u32::try_from(v).map_err(|e| ConfigError::InvalidValue {
                        key: "FLEET_STALENESS_MULTIPLIER",
                        message: e.to_string(),
                    })
                })
                .transpose()?
                .unwrap_or(defaults.staleness_multiplier),
            grace: env_secs("FLEET_STALENESS_GRACE_SECS")?.unwrap_or(defaults.grace),
            sweep_interval: env_secs("FLEET_SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.sweep_interval),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns error if the threshold would be zero or the sweep never runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "FLEET_HEARTBEAT_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.staleness_multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FLEET_STALENESS_MULTIPLIER",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "FLEET_SWEEP_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Age past which a heartbeat is stale.
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        self.heartbeat_interval * self.staleness_multiplier + self.grace
    }
}
