//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use agent_fleet_core::{
    Capability, ChunkStream, EngineError, ExecutionEngine, LocalSession, State, WorkerIdentity,
};
use agent_fleet_store::MemoryStore;
use agent_fleet_worker::{BackoffConfig, Worker, WorkerConfig};
use async_trait::async_trait;
use futures::StreamExt;

#[derive(Default)]
struct Script {
    sessions: Vec<LocalSession>,
    chunks: Vec<Result<String, EngineError>>,
    connect_failures: VecDeque<EngineError>,
    prompt_failures: VecDeque<EngineError>,
    listing_failures: VecDeque<EngineError>,
    hung_connects: usize,
    disconnect_failure: Option<EngineError>,
    connects: usize,
    disconnects: usize,
}

/// Execution engine whose answers are set up by the test.
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<Script>,
}

impl ScriptedEngine {
    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_sessions(&self, sessions: Vec<LocalSession>) {
        self.script().sessions = sessions;
    }

    pub fn set_chunks(&self, chunks: &[&str]) {
        self.script().chunks = chunks.iter().map(|c| Ok((*c).to_string())).collect();
    }

    pub fn fail_next_connect(&self, error: EngineError) {
        self.script().connect_failures.push_back(error);
    }

    /// Make the next `connect` call wait forever.
    pub fn hang_next_connect(&self) {
        self.script().hung_connects += 1;
    }

    pub fn fail_next_prompt(&self, error: EngineError) {
        self.script().prompt_failures.push_back(error);
    }

    pub fn fail_next_listing(&self, error: EngineError) {
        self.script().listing_failures.push_back(error);
    }

    pub fn fail_disconnect(&self, error: EngineError) {
        self.script().disconnect_failure = Some(error);
    }

    pub fn connects(&self) -> usize {
        self.script().connects
    }

    pub fn disconnects(&self) -> usize {
        self.script().disconnects
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    type Handle = usize;

    async fn connect(&self, _working_dir: &Path) -> Result<usize, EngineError> {
        let hang = {
            let mut script = self.script();
            script.connects += 1;
            if let Some(error) = script.connect_failures.pop_front() {
                return Err(error);
            }
            let hang = script.hung_connects > 0;
            script.hung_connects = script.hung_connects.saturating_sub(1);
            hang
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(self.connects())
    }

    async fn capabilities(&self, _handle: &usize) -> Result<Vec<Capability>, EngineError> {
        Ok(vec![Capability::new("chat"), Capability::new("edit")])
    }

    async fn list_sessions(&self, _handle: &usize) -> Result<Vec<LocalSession>, EngineError> {
        let mut script = self.script();
        match script.listing_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(script.sessions.clone()),
        }
    }

    async fn send_prompt(
        &self,
        _handle: &usize,
        session_id: &str,
        _content: &str,
    ) -> Result<ChunkStream, EngineError> {
        let mut script = self.script();
        if let Some(error) = script.prompt_failures.pop_front() {
            return Err(error);
        }
        if !script.sessions.is_empty() && !script.sessions.iter().any(|s| s.id == session_id) {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        Ok(futures::stream::iter(script.chunks.clone()).boxed())
    }

    async fn disconnect(&self, _handle: usize) -> Result<(), EngineError> {
        let mut script = self.script();
        script.disconnects += 1;
        script.disconnect_failure.clone().map_or(Ok(()), Err)
    }
}

pub fn identity() -> WorkerIdentity {
    WorkerIdentity::new("mac-1", "w-1", "secret").unwrap()
}

pub fn config() -> WorkerConfig {
    WorkerConfig {
        approval_poll_interval: Duration::from_secs(1),
        approval_timeout: Duration::from_secs(60),
        heartbeat_interval: Duration::from_secs(10),
        request_timeout: Duration::from_secs(5),
        sync_interval: None,
        recovery_backoff: BackoffConfig {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(4),
        },
        ..WorkerConfig::default()
    }
}

pub type TestWorker = Worker<MemoryStore, ScriptedEngine>;

pub fn worker(store: &Arc<MemoryStore>, engine: &Arc<ScriptedEngine>) -> TestWorker {
    worker_with(config(), store, engine)
}

pub fn worker_with(
    config: WorkerConfig,
    store: &Arc<MemoryStore>,
    engine: &Arc<ScriptedEngine>,
) -> TestWorker {
    Worker::new(config, Arc::clone(store), Arc::clone(engine))
}

/// Wait until the worker reaches `target`, failing the test after ten minutes
/// of (paused) time.
pub async fn wait_for(worker: &TestWorker, target: State) {
    let mut rx = worker.subscribe();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("worker never reached {target}, stuck in {}", worker.state()))
        .unwrap();
}

/// Let spawned tasks run without advancing the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// States visited, in order, starting with the first `from`.
pub fn visited(worker: &TestWorker) -> Vec<State> {
    let history = worker.history();
    let mut states: Vec<State> = history.first().map(|r| r.from).into_iter().collect();
    states.extend(history.iter().map(|r| r.to));
    states
}
