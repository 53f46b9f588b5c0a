//! Heartbeat staleness sweep.
//!
//! The sweep never deletes records; it only flips `Online` workers whose
//! heartbeat is missing or older than the threshold to `Offline`, then
//! recomputes the aggregate status of every machine that lost a worker.
//!
//! The cutoff is fixed before the first write, and each write is conditional
//! on the record still being stale, so overlapping or repeated sweeps are
//! safe without a lock.

use std::{collections::BTreeSet, sync::Arc};

use agent_fleet_core::{OperationalStatus, StoreError, WorkerRegistry};
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SweepConfig;

/// A single write that failed during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{target}: {error}")]
pub struct SweepFailure {
    pub target: String,
    pub error: StoreError,
}

/// Sweep error.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Listing online workers failed: {0}")]
    Scan(#[from] StoreError),
    #[error("Staleness sweep partially failed ({} writes failed)", .0.failures.len())]
    PartialFailure(SweepReport),
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Heartbeats older than this were considered stale.
    pub cutoff: DateTime<Utc>,
    pub scanned: usize,
    /// Workers flipped to offline.
    pub flipped: Vec<String>,
    /// Recomputed machine statuses.
    pub machines: Vec<(String, OperationalStatus)>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// # Errors
    /// Returns [`SweepError::PartialFailure`] if any write failed.
    pub fn into_result(self) -> Result<Self, SweepError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(SweepError::PartialFailure(self))
        }
    }
}

/// Whether a heartbeat taken at `last` is stale relative to `cutoff`.
#[must_use]
pub fn is_stale(last: Option<DateTime<Utc>>, cutoff: DateTime<Utc>) -> bool {
    last.is_none_or(|at| at < cutoff)
}

/// Periodic job demoting silent workers.
pub struct StalenessSweeper<R: ?Sized> {
    registry: Arc<R>,
    config: SweepConfig,
}

impl<R> StalenessSweeper<R>
where
    R: WorkerRegistry + ?Sized + 'static,
{
    #[must_use]
    pub const fn new(registry: Arc<R>, config: SweepConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Heartbeats before the returned instant are stale at `now`.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.staleness_threshold())
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Sweep against the current wall clock.
    ///
    /// # Errors
    /// Returns error if the online workers cannot be listed.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    ///
    /// Individual write failures are collected in [`SweepReport::failures`];
    /// the next sweep retries them naturally.
    ///
    /// # Errors
    /// Returns error if the online workers cannot be listed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let cutoff = self.cutoff(now);
        let online = self.registry.list_online_workers().await?;

        let mut flipped = Vec::new();
        let mut failures = Vec::new();
        let mut affected = BTreeSet::new();

        for worker in &online {
            if !is_stale(worker.last_heartbeat, cutoff) {
                continue;
            }
            match self
                .registry
                .mark_offline_if_stale(&worker.worker_id, cutoff)
                .await
            {
                Ok(true) => {
                    debug!(
                        worker_id = %worker.worker_id,
                        last_heartbeat = ?worker.last_heartbeat,
                        "Worker heartbeat stale, marked offline"
                    );
                    flipped.push(worker.worker_id.clone());
                    affected.insert(worker.machine_id.clone());
                }
                Ok(false) => {
                    debug!(worker_id = %worker.worker_id, "Worker refreshed during sweep, skipped");
                }
                Err(error) => failures.push(SweepFailure {
                    target: format!("worker {}", worker.worker_id),
                    error,
                }),
            }
        }

        let mut machines = Vec::with_capacity(affected.len());
        for machine_id in affected {
            match self.refresh_machine(&machine_id).await {
                Ok(status) => machines.push((machine_id, status)),
                Err(error) => failures.push(SweepFailure {
                    target: format!("machine {machine_id}"),
                    error,
                }),
            }
        }

        if flipped.is_empty() && failures.is_empty() {
            debug!(scanned = online.len(), "Staleness sweep found nothing to do");
        } else {
            info!(
                scanned = online.len(),
                flipped = flipped.len(),
                machines = machines.len(),
                failed = failures.len(),
                "Staleness sweep finished"
            );
        }

        Ok(SweepReport {
            cutoff,
            scanned: online.len(),
            flipped,
            machines,
            failures,
        })
    }

    async fn refresh_machine(&self, machine_id: &str) -> Result<OperationalStatus, StoreError> {
        let workers = self.registry.list_machine_workers(machine_id).await?;
        let status = OperationalStatus::aggregate(workers.iter().map(|w| w.operational_status));
        self.registry.set_machine_status(machine_id, status).await?;
        Ok(status)
    }

    /// Run the sweep every `sweep_interval` until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()>
    where
        R: Send + Sync,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.config.sweep_interval.as_secs(),
                threshold_secs = self.config.staleness_threshold().as_secs(),
                "Starting staleness sweeper"
            );

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!("Staleness sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.sweep().await.and_then(SweepReport::into_result) {
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Staleness sweep incomplete"),
                        }
                    }
                }
            }
        })
    }
}
