//! Error taxonomy shared by the fleet crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Event, State};

/// Transition table violations. Always a local ordering bug; never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsmError {
    #[error("invalid transition: no entry for event '{event}' in state '{from}'")]
    InvalidTransition { from: State, event: Event },
    #[error("state mismatch: expected '{expected}', found '{actual}'")]
    StateMismatch { expected: State, actual: State },
}

/// How the orchestrator reacts to a [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient; an automatic `Recover` is scheduled after backoff.
    Recoverable,
    /// The machine stays in `Error` until an explicit `Stop`.
    Fatal,
}

/// Failure captured into the state machine's error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LifecycleError {
    #[error("registration rejected: {0}")]
    RegistrationRejected(String),
    #[error("approval timed out after {0:?}")]
    ApprovalTimeout(Duration),
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),
    #[error("remote store error: {0}")]
    Store(String),
    #[error("execution engine error: {0}")]
    Engine(String),
    #[error("interrupted by shutdown while {0}")]
    Interrupted(State),
}

impl LifecycleError {
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::RegistrationRejected(_) | Self::Interrupted(_) => Severity::Fatal,
            Self::ApprovalTimeout(_)
            | Self::ConnectionTimeout(_)
            | Self::Store(_)
            | Self::Engine(_) => Severity::Recoverable,
        }
    }

    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self.severity(), Severity::Recoverable)
    }
}

/// Remote store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
    /// Transient rejection (rate limit, conflict); retrying may succeed.
    #[error("store request rejected: {0}")]
    Rejected(String),
    /// The identity is unknown, malformed or denied by an administrator.
    #[error("access denied: {0}")]
    Denied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Internal(String),
}

/// Execution engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("engine session not found: {0}")]
    SessionNotFound(String),
    #[error("output stream failed: {0}")]
    Stream(String),
    #[error("engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the engine connection itself is gone and must be re-established.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_))
    }
}
