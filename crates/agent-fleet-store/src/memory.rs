//! In-memory fleet store.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, PoisonError, RwLock},
};

use agent_fleet_core::{
    ApprovalStatus, Capability, OperationalStatus, Registration, RemoteStore, RemoteWorkerRecord,
    SessionRecord, StoreError, WorkerIdentity, WorkerRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Store operations, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Register,
    CheckApproval,
    SendHeartbeat,
    SetOffline,
    PublishCapabilities,
    WriteChunk,
    CompleteMessage,
    ListSessions,
    CreateSession,
    RenameSession,
    MarkSessionGone,
    ListOnlineWorkers,
    MarkOfflineIfStale,
    ListMachineWorkers,
    SetMachineStatus,
}

struct WorkerEntry {
    record: RemoteWorkerRecord,
    secret: String,
    capabilities: Vec<Capability>,
}

#[derive(Default)]
struct MessageLog {
    chunks: Vec<(u64, String)>,
    content: Option<String>,
}

#[derive(Default)]
struct Inner {
    workers: HashMap<String, WorkerEntry>,
    machines: HashMap<String, OperationalStatus>,
    rejected: HashSet<String>,
    sessions: Vec<SessionRecord>,
    messages: HashMap<(String, String), MessageLog>,
}

impl Inner {
    fn authenticate(&self, identity: &WorkerIdentity) -> Result<&WorkerEntry, StoreError> {
        let entry = self
            .workers
            .get(identity.worker_id())
            .ok_or_else(|| StoreError::Denied(format!("unknown worker {}", identity.worker_id())))?;
        if entry.secret != identity.secret() {
            return Err(StoreError::Denied("secret mismatch".to_string()));
        }
        Ok(entry)
    }

    fn entry_mut(&mut self, identity: &WorkerIdentity) -> Result<&mut WorkerEntry, StoreError> {
        self.authenticate(identity)?;
        self.workers
            .get_mut(identity.worker_id())
            .ok_or_else(|| StoreError::NotFound(identity.worker_id().to_string()))
    }

    fn recompute_machine(&mut self, machine_id: &str) -> OperationalStatus {
        let status = OperationalStatus::aggregate(
            self.workers
                .values()
                .filter(|w| w.record.machine_id == machine_id)
                .map(|w| w.record.operational_status),
        );
        self.machines.insert(machine_id.to_string(), status);
        status
    }

    fn session_mut(&mut self, persisted_id: &str) -> Result<&mut SessionRecord, StoreError> {
        self.sessions
            .iter_mut()
            .find(|s| s.persisted_id == persisted_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {persisted_id}")))
    }
}

/// In-memory store implementation.
///
/// Useful for development, demos and tests. Data is lost on restart.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    auto_approve: bool,
    faults: Mutex<HashMap<StoreOp, VecDeque<StoreError>>>,
    stalls: Mutex<HashMap<StoreOp, usize>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store where new workers start `Pending`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            auto_approve: false,
            faults: Mutex::new(HashMap::new()),
            stalls: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create a store that approves workers on first registration.
    #[must_use]
    pub fn auto_approving() -> Self {
        Self {
            auto_approve: true,
            ..Self::new()
        }
    }

    /// Fail the next call of `op` with `error`. Queued failures are consumed in order.
    pub fn inject_failure(&self, op: StoreOp, error: StoreError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make the next call of `op` never complete.
    pub fn stall_next(&self, op: StoreOp) {
        *self
            .stalls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default() += 1;
    }

    /// Number of calls made to `op`, including failed ones.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default() += 1;
        let stalled = {
            let mut stalls = self.stalls.lock().unwrap_or_else(PoisonError::into_inner);
            match stalls.get_mut(&op) {
                Some(pending) if *pending > 0 => {
                    *pending -= 1;
                    true
                }
                _ => false,
            }
        };
        if stalled {
            debug!(?op, "Stalling store call");
            std::future::pending::<()>().await;
        }
        match self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Approve a worker. Returns whether a record was found.
    pub fn approve(&self, worker_id: &str) -> bool {
        let mut inner = self.write();
        inner.workers.get_mut(worker_id).is_some_and(|entry| {
            entry.record.approval_status = ApprovalStatus::Approved;
            info!(worker_id, "Worker approved");
            true
        })
    }

    /// Reject a pending worker: its record is removed and later requests are denied.
    pub fn reject(&self, worker_id: &str) -> bool {
        let mut inner = self.write();
        let removed = inner.workers.remove(worker_id);
        inner.rejected.insert(worker_id.to_string());
        if let Some(entry) = &removed {
            let machine_id = entry.record.machine_id.clone();
            inner.recompute_machine(&machine_id);
            info!(worker_id, "Worker rejected");
        }
        removed.is_some()
    }

    /// Explicitly delete a worker record. The worker may register again.
    pub fn delete_worker(&self, worker_id: &str) -> bool {
        let mut inner = self.write();
        let removed = inner.workers.remove(worker_id);
        if let Some(entry) = &removed {
            let machine_id = entry.record.machine_id.clone();
            inner.recompute_machine(&machine_id);
            info!(worker_id, "Worker deleted");
        }
        removed.is_some()
    }

    #[must_use]
    pub fn worker(&self, worker_id: &str) -> Option<RemoteWorkerRecord> {
        self.read().workers.get(worker_id).map(|w| w.record.clone())
    }

    #[must_use]
    pub fn machine_status(&self, machine_id: &str) -> Option<OperationalStatus> {
        self.read().machines.get(machine_id).copied()
    }

    #[must_use]
    pub fn capabilities(&self, worker_id: &str) -> Vec<Capability> {
        self.read()
            .workers
            .get(worker_id)
            .map(|w| w.capabilities.clone())
            .unwrap_or_default()
    }

    /// Insert or replace a worker record directly, bypassing registration.
    pub fn seed_worker(&self, record: RemoteWorkerRecord, secret: impl Into<String>) {
        let mut inner = self.write();
        let machine_id = record.machine_id.clone();
        inner.workers.insert(
            record.worker_id.clone(),
            WorkerEntry {
                record,
                secret: secret.into(),
                capabilities: Vec::new(),
            },
        );
        inner.recompute_machine(&machine_id);
    }

    /// Overwrite a worker's heartbeat timestamp without touching its status.
    pub fn set_last_heartbeat(&self, worker_id: &str, at: Option<DateTime<Utc>>) -> bool {
        self.write()
            .workers
            .get_mut(worker_id)
            .is_some_and(|entry| {
                entry.record.last_heartbeat = at;
                true
            })
    }

    /// Insert a session record, returning its persisted id.
    pub fn seed_session(&self, record: SessionRecord) -> String {
        let id = record.persisted_id.clone();
        self.write().sessions.push(record);
        id
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.read().sessions.clone()
    }

    /// Chunks written for a message, in arrival order.
    #[must_use]
    pub fn chunks(&self, session_id: &str, message_id: &str) -> Vec<(u64, String)> {
        self.read()
            .messages
            .get(&(session_id.to_string(), message_id.to_string()))
            .map(|m| m.chunks.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn completed_message(&self, session_id: &str, message_id: &str) -> Option<String> {
        self.read()
            .messages
            .get(&(session_id.to_string(), message_id.to_string()))
            .and_then(|m| m.content.clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn register(&self, identity: &WorkerIdentity) -> Result<Registration, StoreError> {
        self.enter(StoreOp::Register).await?;
        let mut inner = self.write();
        if inner.rejected.contains(identity.worker_id()) {
            return Err(StoreError::Denied(format!(
                "worker {} was rejected",
                identity.worker_id()
            )));
        }
        if inner.workers.contains_key(identity.worker_id()) {
            let entry = inner.authenticate(identity)?;
            return Ok(Registration {
                approved: entry.record.approval_status == ApprovalStatus::Approved,
            });
        }

        let approval_status = if self.auto_approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };
        inner.workers.insert(
            identity.worker_id().to_string(),
            WorkerEntry {
                record: RemoteWorkerRecord {
                    worker_id: identity.worker_id().to_string(),
                    machine_id: identity.machine_id().to_string(),
                    approval_status,
                    operational_status: OperationalStatus::Offline,
                    last_heartbeat: None,
                },
                secret: identity.secret().to_string(),
                capabilities: Vec::new(),
            },
        );
        inner.recompute_machine(identity.machine_id());
        debug!(worker_id = identity.worker_id(), ?approval_status, "Worker registered");
        Ok(Registration {
            approved: approval_status == ApprovalStatus::Approved,
        })
    }

    async fn check_approval(&self, identity: &WorkerIdentity) -> Result<bool, StoreError> {
        self.enter(StoreOp::CheckApproval).await?;
        let inner = self.read();
        if inner.rejected.contains(identity.worker_id()) {
            return Err(StoreError::Denied(format!(
                "worker {} was rejected",
                identity.worker_id()
            )));
        }
        let entry = inner.authenticate(identity)?;
        Ok(entry.record.approval_status == ApprovalStatus::Approved)
    }

    async fn send_heartbeat(&self, identity: &WorkerIdentity) -> Result<(), StoreError> {
        self.enter(StoreOp::SendHeartbeat).await?;
        let mut inner = self.write();
        let entry = inner.entry_mut(identity)?;
        entry.record.last_heartbeat = Some(Utc::now());
        entry.record.operational_status = OperationalStatus::Online;
        inner
            .machines
            .insert(identity.machine_id().to_string(), OperationalStatus::Online);
        Ok(())
    }

    async fn set_offline(&self, identity: &WorkerIdentity) -> Result<(), StoreError> {
        self.enter(StoreOp::SetOffline).await?;
        let mut inner = self.write();
        inner.entry_mut(identity)?.record.operational_status = OperationalStatus::Offline;
        inner.recompute_machine(identity.machine_id());
        Ok(())
    }

    async fn publish_capabilities(
        &self,
        identity: &WorkerIdentity,
        capabilities: &[Capability],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::PublishCapabilities).await?;
        self.write().entry_mut(identity)?.capabilities = capabilities.to_vec();
        Ok(())
    }

    async fn write_chunk(
        &self,
        session_id: &str,
        message_id: &str,
        chunk: &str,
        sequence: u64,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::WriteChunk).await?;
        self.write()
            .messages
            .entry((session_id.to_string(), message_id.to_string()))
            .or_default()
            .chunks
            .push((sequence, chunk.to_string()));
        Ok(())
    }

    async fn complete_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::CompleteMessage).await?;
        self.write()
            .messages
            .entry((session_id.to_string(), message_id.to_string()))
            .or_default()
            .content = Some(content.to_string());
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.enter(StoreOp::ListSessions).await?;
        Ok(self.read().sessions.clone())
    }

    async fn create_session(
        &self,
        local_id: &str,
        title: Option<&str>,
    ) -> Result<String, StoreError> {
        self.enter(StoreOp::CreateSession).await?;
        let persisted_id = Uuid::new_v4().to_string();
        self.write().sessions.push(SessionRecord::linked(
            persisted_id.clone(),
            local_id,
            title,
        ));
        Ok(persisted_id)
    }

    async fn rename_session(&self, persisted_id: &str, name: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::RenameSession).await?;
        self.write().session_mut(persisted_id)?.name = Some(name.to_string());
        Ok(())
    }

    async fn mark_session_gone(&self, persisted_id: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::MarkSessionGone).await?;
        self.write().session_mut(persisted_id)?.marked_gone = true;
        Ok(())
    }
}

#[async_trait]
impl WorkerRegistry for MemoryStore {
    async fn list_online_workers(&self) -> Result<Vec<RemoteWorkerRecord>, StoreError> {
        self.enter(StoreOp::ListOnlineWorkers).await?;
        Ok(self
            .read()
            .workers
            .values()
            .filter(|w| w.record.operational_status == OperationalStatus::Online)
            .map(|w| w.record.clone())
            .collect())
    }

    async fn mark_offline_if_stale(
        &self,
        worker_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.enter(StoreOp::MarkOfflineIfStale).await?;
        let mut inner = self.write();
        let Some(entry) = inner.workers.get_mut(worker_id) else {
            return Ok(false);
        };
        let stale = entry.record.last_heartbeat.is_none_or(|at| at < cutoff);
        if entry.record.operational_status != OperationalStatus::Online || !stale {
            return Ok(false);
        }
        entry.record.operational_status = OperationalStatus::Offline;
        Ok(true)
    }

    async fn list_machine_workers(
        &self,
        machine_id: &str,
    ) -> Result<Vec<RemoteWorkerRecord>, StoreError> {
        self.enter(StoreOp::ListMachineWorkers).await?;
        Ok(self
            .read()
            .workers
            .values()
            .filter(|w| w.record.machine_id == machine_id)
            .map(|w| w.record.clone())
            .collect())
    }

    async fn set_machine_status(
        &self,
        machine_id: &str,
        status: OperationalStatus,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::SetMachineStatus).await?;
        self.write().machines.insert(machine_id.to_string(), status);
        Ok(())
    }
}
