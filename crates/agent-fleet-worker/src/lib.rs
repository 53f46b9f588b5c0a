//! Worker lifecycle orchestration.
//!
//! Provides:
//! - `Worker` - Drives the lifecycle state machine through registration,
//!   approval, connection, message relay and shutdown
//! - `WorkerConfig` - Explicit configuration with `from_env` loading
//! - `PeriodicTask` - Cancellable fixed-interval task

pub mod backoff;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod orchestrator;
pub mod task;

pub use agent_fleet_core::ConfigError;
pub use config::{BackoffConfig, WorkerConfig};
pub use error::{ShutdownError, ShutdownFailure, WorkerError};
pub use message::{InboundMessage, MessageOutcome};
pub use orchestrator::Worker;
pub use task::PeriodicTask;
