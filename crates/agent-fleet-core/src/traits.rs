//! Collaborator traits for the remote store and the execution engine.
//!
//! Implementations are expected to bound their own calls with a timeout;
//! the worker additionally bounds every call it makes.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::{
    Capability, EngineError, LocalSession, OperationalStatus, Registration, RemoteWorkerRecord,
    SessionRecord, StoreError, WorkerIdentity,
};

/// Ordered, finite stream of output chunks for one prompt.
pub type ChunkStream = BoxStream<'static, Result<String, EngineError>>;

/// Worker-facing side of the shared session/record store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Register (or re-register) the worker.
    async fn register(&self, identity: &WorkerIdentity) -> Result<Registration, StoreError>;

    /// Whether an administrator has approved the worker.
    async fn check_approval(&self, identity: &WorkerIdentity) -> Result<bool, StoreError>;

    /// Idempotent liveness write.
    async fn send_heartbeat(&self, identity: &WorkerIdentity) -> Result<(), StoreError>;

    /// Mark the worker offline.
    async fn set_offline(&self, identity: &WorkerIdentity) -> Result<(), StoreError>;

    /// Publish the execution engine's capabilities.
    async fn publish_capabilities(
        &self,
        identity: &WorkerIdentity,
        capabilities: &[Capability],
    ) -> Result<(), StoreError>;

    /// Append one output chunk of a message.
    async fn write_chunk(
        &self,
        session_id: &str,
        message_id: &str,
        chunk: &str,
        sequence: u64,
    ) -> Result<(), StoreError>;

    /// Store the final content of a message.
    async fn complete_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Create a record linked to `local_id`, returning its persisted id.
    async fn create_session(
        &self,
        local_id: &str,
        title: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn rename_session(&self, persisted_id: &str, name: &str) -> Result<(), StoreError>;

    /// Flag a record as gone. Records are never deleted by the worker.
    async fn mark_session_gone(&self, persisted_id: &str) -> Result<(), StoreError>;
}

/// Store-side view of worker records used by the staleness sweeper.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// All worker records currently `Online`.
    async fn list_online_workers(&self) -> Result<Vec<RemoteWorkerRecord>, StoreError>;

    /// Flip a worker offline only if its heartbeat is still missing or older
    /// than `cutoff` at write time. Returns whether the record was changed.
    async fn mark_offline_if_stale(
        &self,
        worker_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_machine_workers(
        &self,
        machine_id: &str,
    ) -> Result<Vec<RemoteWorkerRecord>, StoreError>;

    async fn set_machine_status(
        &self,
        machine_id: &str,
        status: OperationalStatus,
    ) -> Result<(), StoreError>;
}

/// Local AI-assistant execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Connection handle.
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self, working_dir: &Path) -> Result<Self::Handle, EngineError>;

    async fn capabilities(&self, handle: &Self::Handle) -> Result<Vec<Capability>, EngineError>;

    async fn list_sessions(&self, handle: &Self::Handle)
    -> Result<Vec<LocalSession>, EngineError>;

    /// Send a prompt; restartable only by calling again.
    async fn send_prompt(
        &self,
        handle: &Self::Handle,
        session_id: &str,
        content: &str,
    ) -> Result<ChunkStream, EngineError>;

    async fn disconnect(&self, handle: Self::Handle) -> Result<(), EngineError>;
}
