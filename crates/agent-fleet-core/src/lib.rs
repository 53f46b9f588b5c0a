//! Core abstractions for coordinating a fleet of agent workers.
//!
//! This crate provides the fundamental building blocks:
//! - `StateMachine` - Worker lifecycle FSM with a fixed transition table
//! - `TransitionHistory` - Bounded ring buffer of transition records
//! - `WorkerIdentity` and the remote record types
//! - `config` - `FLEET_*` environment parsing helpers
//! - `RemoteStore`, `WorkerRegistry` and `ExecutionEngine` collaborator traits

pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod machine;
pub mod records;
pub mod state;
pub mod traits;

pub use config::ConfigError;
pub use error::{EngineError, FsmError, LifecycleError, Severity, StoreError};
pub use history::{TransitionHistory, TransitionRecord};
pub use identity::{IdentityError, WorkerIdentity};
pub use machine::StateMachine;
pub use records::{
    ApprovalStatus, Capability, LocalSession, OperationalStatus, Registration,
    RemoteWorkerRecord, SessionRecord,
};
pub use state::{Event, State};
pub use traits::{ChunkStream, ExecutionEngine, RemoteStore, WorkerRegistry};
