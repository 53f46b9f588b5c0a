//! Local fleet demo.
//!
//! Runs one worker against the in-memory store and an echo engine: the
//! worker registers, waits until it is approved, relays a prompt, syncs its
//! sessions and shuts down. A staleness sweeper runs alongside it.
//!
//! Identity comes from `FLEET_MACHINE_ID`, `FLEET_WORKER_ID` and
//! `FLEET_WORKER_SECRET` when set; a throwaway identity is used otherwise.

use std::{path::Path, sync::Arc};

use agent_fleet_core::{
    Capability, ChunkStream, EngineError, ExecutionEngine, LocalSession, State, WorkerIdentity,
};
use agent_fleet_store::{MemoryStore, StalenessSweeper, SweepConfig};
use agent_fleet_worker::{InboundMessage, Worker, WorkerConfig};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Engine that answers every prompt by echoing it back word by word.
struct EchoEngine {
    sessions: Vec<LocalSession>,
}

#[async_trait]
impl ExecutionEngine for EchoEngine {
    type Handle = Uuid;

    async fn connect(&self, working_dir: &Path) -> Result<Uuid, EngineError> {
        let handle = Uuid::new_v4();
        tracing::info!(%handle, working_dir = %working_dir.display(), "Echo engine connected");
        Ok(handle)
    }

    async fn capabilities(&self, _handle: &Uuid) -> Result<Vec<Capability>, EngineError> {
        Ok(vec![Capability {
            name: "echo".to_string(),
            description: Some("Repeats the prompt".to_string()),
        }])
    }

    async fn list_sessions(&self, _handle: &Uuid) -> Result<Vec<LocalSession>, EngineError> {
        Ok(self.sessions.clone())
    }

    async fn send_prompt(
        &self,
        _handle: &Uuid,
        session_id: &str,
        content: &str,
    ) -> Result<ChunkStream, EngineError> {
        if !self.sessions.iter().any(|s| s.id == session_id) {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        let words: Vec<Result<String, EngineError>> = content
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(futures::stream::iter(words).boxed())
    }

    async fn disconnect(&self, handle: Uuid) -> Result<(), EngineError> {
        tracing::info!(%handle, "Echo engine disconnected");
        Ok(())
    }
}

fn identity() -> anyhow::Result<WorkerIdentity> {
    if std::env::var_os("FLEET_WORKER_ID").is_some() {
        return WorkerIdentity::from_env().context("invalid worker identity");
    }
    let worker_id = format!("worker-{}", Uuid::new_v4().simple());
    WorkerIdentity::new("local-machine", worker_id, Uuid::new_v4().to_string())
        .context("invalid worker identity")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    let sweep_config = SweepConfig::from_env().context("invalid sweep configuration")?;
    let identity = identity()?;
    let worker_id = identity.worker_id().to_string();

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(EchoEngine {
        sessions: vec![
            LocalSession::new("local-1", Some("Scratchpad")),
            LocalSession::new("local-2", None),
        ],
    });

    let shutdown = CancellationToken::new();
    let sweeper = StalenessSweeper::new(Arc::clone(&store), sweep_config).spawn(shutdown.clone());

    let worker = Worker::new(config, Arc::clone(&store), engine);
    let mut states = worker.subscribe();
    worker.start(identity).await?;

    states
        .wait_for(|s| matches!(s, State::WaitingApproval | State::Ready | State::Error))
        .await?;
    if worker.state() == State::WaitingApproval {
        tracing::info!(worker_id = %worker_id, "Approving worker");
        store.approve(&worker_id);
    }
    let reached = *states
        .wait_for(|s| matches!(s, State::Ready | State::Error))
        .await?;
    if reached == State::Error {
        let reason = worker.last_error();
        worker.stop().await?;
        anyhow::bail!("worker failed to become ready: {reason:?}");
    }

    let outcome = worker
        .process_message(&InboundMessage {
            session_id: "local-1".to_string(),
            message_id: Uuid::new_v4().to_string(),
            content: "hello from the local fleet".to_string(),
        })
        .await?;
    tracing::info!(chunks = outcome.chunks, content = %outcome.content, "Prompt relayed");

    let synced = worker.sync_sessions().await?;
    tracing::info!(
        created = synced.created,
        renamed = synced.renamed,
        marked_gone = synced.marked_gone,
        "Sessions synced"
    );

    worker.stop().await?;
    shutdown.cancel();
    sweeper.await.context("staleness sweeper panicked")?;

    println!("{}", serde_json::to_string_pretty(&worker.history())?);
    Ok(())
}
