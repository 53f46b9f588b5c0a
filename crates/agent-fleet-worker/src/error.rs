//! Worker errors.

use std::fmt;

use agent_fleet_core::{EngineError, FsmError, StoreError};
use agent_fleet_session::SyncError;
use thiserror::Error;

/// A cleanup step that failed during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    pub step: &'static str,
    pub error: String,
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

/// Every failed step of one shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownError {
    pub failures: Vec<ShutdownFailure>,
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} shutdown step(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// Worker error.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Fsm(#[from] FsmError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Session sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("Shutdown incomplete: {0}")]
    Shutdown(ShutdownError),
    #[error("Worker is not connected to the execution engine")]
    NotConnected,
    #[error("Cancelled by shutdown")]
    Cancelled,
}
