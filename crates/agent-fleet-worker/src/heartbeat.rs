//! Heartbeat sender.
//!
//! Sends an idempotent liveness write on every tick while the worker is
//! connecting or ready. Failures are logged and retried on the next tick;
//! they never cause a state transition.

use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use agent_fleet_core::{RemoteStore, StoreError, WorkerIdentity};
use tracing::{debug, error, info, warn};

use crate::PeriodicTask;

/// Consecutive failures logged as warnings before escalating to errors.
const WARN_THRESHOLD: u32 = 3;

/// Start the heartbeat loop. The first heartbeat is sent immediately.
pub fn spawn_heartbeat<S>(
    store: Arc<S>,
    identity: Arc<WorkerIdentity>,
    interval: Duration,
    request_timeout: Duration,
) -> PeriodicTask
where
    S: RemoteStore + ?Sized + 'static,
{
    info!(
        worker_id = identity.worker_id(),
        interval_secs = interval.as_secs(),
        "Starting heartbeat loop"
    );
    let consecutive_failures = Arc::new(AtomicU32::new(0));

    PeriodicTask::spawn("heartbeat", tokio::time::interval(interval), move || {
        let store = Arc::clone(&store);
        let identity = Arc::clone(&identity);
        let consecutive_failures = Arc::clone(&consecutive_failures);
        async move {
            let result = tokio::time::timeout(request_timeout, store.send_heartbeat(&identity))
                .await
                .unwrap_or(Err(StoreError::Timeout(request_timeout)));

            match result {
                Ok(()) => {
                    consecutive_failures.store(0, Ordering::Relaxed);
                    debug!(worker_id = identity.worker_id(), "Heartbeat acknowledged");
                }
                Err(e) => {
                    let failures = consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures <= WARN_THRESHOLD {
                        warn!(
                            worker_id = identity.worker_id(),
                            error = %e,
                            consecutive_failures = failures,
                            "Heartbeat failed"
                        );
                    } else {
                        error!(
                            worker_id = identity.worker_id(),
                            error = %e,
                            consecutive_failures = failures,
                            "Heartbeat failed repeatedly"
                        );
                    }
                }
            }
            ControlFlow::Continue(())
        }
    })
}

#[cfg(test)]
mod tests {
    use agent_fleet_core::OperationalStatus;
    use agent_fleet_store::{MemoryStore, StoreOp};
    use tokio_test::assert_ok;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let store = Arc::new(MemoryStore::auto_approving());
        let identity = Arc::new(WorkerIdentity::new("mac-1", "w-1", "secret").unwrap());
        assert_ok!(store.register(&identity).await);
        for _ in 0..5 {
            store.inject_failure(
                StoreOp::SendHeartbeat,
                StoreError::Rejected("busy".to_string()),
            );
        }

        let task = spawn_heartbeat(
            Arc::clone(&store),
            Arc::clone(&identity),
            Duration::from_secs(30),
            Duration::from_secs(5),
        );
        tokio::time::sleep(Duration::from_secs(185)).await;

        assert_eq!(store.call_count(StoreOp::SendHeartbeat), 7);
        assert_eq!(
            store.worker("w-1").unwrap().operational_status,
            OperationalStatus::Online
        );
        assert_ok!(task.shutdown().await);
    }
}
