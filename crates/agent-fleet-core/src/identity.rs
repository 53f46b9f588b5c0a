//! Worker identity.

use std::fmt;

use thiserror::Error;

/// Identity validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("missing required value: {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Credentials a worker presents to the remote store.
///
/// Validated once at construction and immutable afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    machine_id: String,
    worker_id: String,
    secret: String,
}

impl WorkerIdentity {
    /// Build a validated identity.
    ///
    /// # Errors
    /// Returns error if any field is empty or an id contains whitespace.
    pub fn new(
        machine_id: impl Into<String>,
        worker_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let machine_id = validate_id("machine_id", machine_id.into())?;
        let worker_id = validate_id("worker_id", worker_id.into())?;
        let secret = secret.into();
        if secret.is_empty() {
            return Err(IdentityError::Missing("secret"));
        }
        Ok(Self {
            machine_id,
            worker_id,
            secret,
        })
    }

    /// Load from `FLEET_MACHINE_ID`, `FLEET_WORKER_ID` and `FLEET_WORKER_SECRET`.
    ///
    /// # Errors
    /// Returns error if a variable is unset or invalid.
    pub fn from_env() -> Result<Self, IdentityError> {
        let read = |key: &'static str| std::env::var(key).map_err(|_| IdentityError::Missing(key));
        Self::new(
            read("FLEET_MACHINE_ID")?,
            read("FLEET_WORKER_ID")?,
            read("FLEET_WORKER_SECRET")?,
        )
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerIdentity")
            .field("machine_id", &self.machine_id)
            .field("worker_id", &self.worker_id)
            .field("secret", &"[redacted]")
            .finish()
    }
}

fn validate_id(field: &'static str, value: String) -> Result<String, IdentityError> {
    if value.is_empty() {
        return Err(IdentityError::Missing(field));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(IdentityError::Invalid {
            field,
            reason: "must not contain whitespace".to_string(),
        });
    }
    Ok(value)
}
