//! Cancellable fixed-interval task.

use std::{future::Future, ops::ControlFlow};

use tokio::{
    task::{JoinError, JoinHandle},
    time::{Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A task running `tick` on every interval tick until cancelled or until a
/// tick returns `ControlFlow::Break`.
///
/// The token is checked before every tick and an in-flight tick is dropped
/// as soon as it fires. Dropping the handle cancels the task.
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, mut interval: Interval, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if cancelled.is_cancelled() {
                    break;
                }
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    flow = tick() => {
                        if flow.is_break() {
                            break;
                        }
                    }
                }
            }
            debug!(task = name, "Periodic task exited");
        });

        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Request cancellation without waiting. No tick starts after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit.
    ///
    /// # Errors
    /// Returns the join error if the task panicked.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
