//! Concurrent plan execution.

use agent_fleet_core::{LocalSession, RemoteStore, StoreError};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plan::{SyncOperation, SyncPlan, calculate_sync_plan, is_convergent};

/// One operation that failed while executing a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reconciliation operation failed: {operation}: {error}")]
pub struct SyncFailure {
    pub operation: SyncOperation,
    pub error: StoreError,
}

/// Sync error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Listing stored sessions failed: {0}")]
    Store(#[from] StoreError),
    #[error("Sync plan does not converge ({remaining} operations left after applying it)")]
    NotConvergent { remaining: usize },
}

/// Outcome of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub renamed: usize,
    pub marked_gone: usize,
    pub created: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    /// Whether every operation succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn applied(&self) -> usize {
        self.renamed + self.marked_gone + self.created
    }
}

/// Apply every operation of `plan` concurrently.
///
/// Each operation settles independently; a failure is recorded and never
/// stops or rolls back the others.
pub async fn execute_sync<S>(plan: SyncPlan, store: &S) -> SyncResult
where
    S: RemoteStore + ?Sized,
{
    let outcomes = join_all(plan.into_operations().into_iter().map(|op| async move {
        let result = apply_operation(store, &op).await;
        (op, result)
    }))
    .await;

    let mut result = SyncResult::default();
    for (operation, outcome) in outcomes {
        match outcome {
            Ok(()) => match operation {
                SyncOperation::Rename(_) => result.renamed += 1,
                SyncOperation::MarkGone(_) => result.marked_gone += 1,
                SyncOperation::Create(_) => result.created += 1,
            },
            Err(error) => {
                warn!(%operation, %error, "Sync operation failed");
                result.failures.push(SyncFailure { operation, error });
            }
        }
    }
    result
}

async fn apply_operation<S>(store: &S, operation: &SyncOperation) -> Result<(), StoreError>
where
    S: RemoteStore + ?Sized,
{
    match operation {
        SyncOperation::Rename(rename) => {
            store
                .rename_session(&rename.persisted_id, &rename.name)
                .await
        }
        SyncOperation::MarkGone(deletion) => store.mark_session_gone(&deletion.persisted_id).await,
        SyncOperation::Create(creation) => {
            let persisted_id = store
                .create_session(&creation.local_id, creation.title.as_deref())
                .await?;
            debug!(local_id = %creation.local_id, %persisted_id, "Created session record");
            Ok(())
        }
    }
}

/// Bring the stored records in line with `local`.
///
/// # Errors
/// Returns error if the stored sessions cannot be listed or the computed
/// plan would not converge. Per-operation failures are reported in
/// [`SyncResult::failures`].
pub async fn reconcile<S>(local: &[LocalSession], store: &S) -> Result<SyncResult, SyncError>
where
    S: RemoteStore + ?Sized,
{
    let persisted = store.list_sessions().await?;
    let plan = calculate_sync_plan(local, &persisted);
    if plan.is_empty() {
        debug!(sessions = local.len(), "Sessions already in sync");
        return Ok(SyncResult::default());
    }
    if !is_convergent(local, &persisted, &plan) {
        let remaining = calculate_sync_plan(local, &crate::apply_plan(&plan, &persisted)).len();
        return Err(SyncError::NotConvergent { remaining });
    }

    let result = execute_sync(plan, store).await;
    info!(
        renamed = result.renamed,
        marked_gone = result.marked_gone,
        created = result.created,
        failed = result.failures.len(),
        "Session sync finished"
    );
    Ok(result)
}
