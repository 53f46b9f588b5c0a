//! Relaying prompts to the execution engine and its output to the store.

use std::time::Duration;

use agent_fleet_core::{EngineError, ExecutionEngine, RemoteStore, StoreError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use crate::WorkerError;

/// A user message addressed to an engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub session_id: String,
    pub message_id: String,
    pub content: String,
}

/// Result of relaying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    /// Number of chunks written; sequence numbers ran `0..chunks`.
    pub chunks: u64,
    /// Concatenated output.
    pub content: String,
}

/// Forward `message` to the engine and stream its output to the store.
///
/// Chunks are written one at a time in arrival order with sequence numbers
/// starting at 0. The first failed write aborts the message; the message is
/// only completed once every chunk has been stored.
pub(crate) async fn relay<S, E>(
    store: &S,
    engine: &E,
    handle: &E::Handle,
    message: &InboundMessage,
    request_timeout: Duration,
) -> Result<MessageOutcome, WorkerError>
where
    S: RemoteStore + ?Sized,
    E: ExecutionEngine + ?Sized,
{
    let mut stream = timeout(
        request_timeout,
        engine.send_prompt(handle, &message.session_id, &message.content),
    )
    .await
    .map_err(|_| EngineError::Timeout(request_timeout))??;

    let mut sequence = 0u64;
    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        timeout(
            request_timeout,
            store.write_chunk(&message.session_id, &message.message_id, &chunk, sequence),
        )
        .await
        .map_err(|_| StoreError::Timeout(request_timeout))??;
        content.push_str(&chunk);
        sequence += 1;
    }

    timeout(
        request_timeout,
        store.complete_message(&message.session_id, &message.message_id, &content),
    )
    .await
    .map_err(|_| StoreError::Timeout(request_timeout))??;

    debug!(
        session_id = %message.session_id,
        message_id = %message.message_id,
        chunks = sequence,
        "Message relayed"
    );
    Ok(MessageOutcome {
        chunks: sequence,
        content,
    })
}
