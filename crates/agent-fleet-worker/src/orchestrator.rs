//! Worker lifecycle orchestrator.
//!
//! `Worker` owns one [`StateMachine`] and drives it through the side-effecting
//! phases of a worker's life:
//!
//! - `Registering`: register with the store; approved workers go straight to
//!   `Connecting`, pending ones to `WaitingApproval`
//! - `WaitingApproval`: poll the approval check until it answers yes
//! - `Connecting`: start heartbeats, connect the engine, publish capabilities
//! - `Ready`: sync sessions on entry, relay messages, keep sessions in sync;
//!   a lost engine connection moves to `Error`
//! - `Error`: recover after a bounded backoff, or wait for `stop()` if fatal
//! - `Stopping`: cancel every task, disconnect, go offline, then `Stopped`
//!
//! Phases run one at a time on a single driver task, and the event that
//! advances the machine is fired only after the phase's calls succeeded.
//! Periodic tasks are owned by the worker and cancelled inside the same
//! critical section as the transition that leaves their owning state.

use std::{
    future::Future,
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak},
    time::Duration,
};

use agent_fleet_core::{
    EngineError, Event, ExecutionEngine, FsmError, LifecycleError, RemoteStore, State,
    StateMachine, StoreError, TransitionRecord, WorkerIdentity,
};
use agent_fleet_session::{SyncResult, reconcile};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    InboundMessage, MessageOutcome, PeriodicTask, ShutdownError, ShutdownFailure, WorkerConfig,
    WorkerError, backoff::Backoff, heartbeat::spawn_heartbeat, message,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Phase a collaborator call belongs to; decides which timeout it maps to.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Registration,
    Connection,
}

impl Phase {
    const fn timeout(self, after: Duration) -> LifecycleError {
        match self {
            Self::Registration => LifecycleError::ApprovalTimeout(after),
            Self::Connection => LifecycleError::ConnectionTimeout(after),
        }
    }

    fn store_failure(self, error: StoreError) -> LifecycleError {
        match error {
            StoreError::Denied(reason) => LifecycleError::RegistrationRejected(reason),
            StoreError::Timeout(after) => self.timeout(after),
            other => LifecycleError::Store(other.to_string()),
        }
    }
}

fn engine_failure(error: EngineError) -> LifecycleError {
    match error {
        EngineError::Timeout(after) => LifecycleError::ConnectionTimeout(after),
        other => LifecycleError::Engine(other.to_string()),
    }
}

/// The task running lifecycle phases, with the token that cancels it.
type Driver = (CancellationToken, JoinHandle<()>);

/// Tasks owned by the worker.
#[derive(Default)]
struct Tasks {
    driver: Option<Driver>,
    approval_poll: Option<PeriodicTask>,
    heartbeat: Option<PeriodicTask>,
    session_sync: Option<PeriodicTask>,
}

impl Tasks {
    /// Cancel every periodic task whose owning state is left by moving to `to`.
    fn on_transition(&self, to: State) {
        if to != State::WaitingApproval {
            if let Some(task) = &self.approval_poll {
                task.cancel();
            }
        }
        if !matches!(to, State::Connecting | State::Ready) {
            if let Some(task) = &self.heartbeat {
                task.cancel();
            }
        }
        if to != State::Ready {
            if let Some(task) = &self.session_sync {
                task.cancel();
            }
        }
    }

    fn take_periodic(&mut self) -> Vec<PeriodicTask> {
        [
            self.approval_poll.take(),
            self.heartbeat.take(),
            self.session_sync.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct Shared<S, E: ExecutionEngine> {
    config: WorkerConfig,
    store: Arc<S>,
    engine: Arc<E>,
    identity: OnceLock<Arc<WorkerIdentity>>,
    machine: Mutex<StateMachine>,
    state_tx: watch::Sender<State>,
    tasks: Mutex<Tasks>,
    connection: Mutex<Option<E::Handle>>,
    /// Cancelled when shutdown begins; aborts in-flight messages.
    messages: CancellationToken,
}

impl<S, E> Shared<S, E>
where
    S: RemoteStore + 'static,
    E: ExecutionEngine + 'static,
{
    fn state(&self) -> State {
        lock(&self.machine).state()
    }

    fn worker_id(&self) -> &str {
        self.identity.get().map_or("-", |id| id.worker_id())
    }

    /// Fire `event`, optionally capturing `error` into the slot first.
    ///
    /// Owned tasks are cancelled before the machine lock is released.
    fn fire(&self, event: Event, error: Option<LifecycleError>) -> Result<State, FsmError> {
        let mut machine = lock(&self.machine);
        let from = machine.state();
        if !machine.can_transition(event) {
            return Err(FsmError::InvalidTransition { from, event });
        }
        if let Some(error) = error {
            machine.set_error(error);
        }
        let to = machine.transition(event)?;
        lock(&self.tasks).on_transition(to);
        if to == State::Stopping {
            self.messages.cancel();
        }
        self.state_tx.send_replace(to);
        drop(machine);

        info!(worker_id = self.worker_id(), %from, %to, %event, "Worker state changed");
        Ok(to)
    }

    fn fail(&self, error: LifecycleError) -> Result<State, FsmError> {
        warn!(worker_id = self.worker_id(), error = %error, "Lifecycle phase failed");
        self.fire(Event::Error, Some(error))
    }

    /// Fire `Stop`, routing through `Error` first when a phase is interrupted.
    ///
    /// Returns the driver started since the caller last took it, if any.
    fn begin_stop(&self) -> Result<Option<Driver>, FsmError> {
        let mut machine = lock(&self.machine);
        let from = machine.state();
        if matches!(from, State::Registering | State::Connecting) {
            let error = LifecycleError::Interrupted(from);
            warn!(worker_id = self.worker_id(), error = %error, "Lifecycle phase failed");
            machine.set_error(error);
            machine.transition(Event::Error)?;
            info!(
                worker_id = self.worker_id(),
                %from,
                to = %State::Error,
                event = %Event::Error,
                "Worker state changed"
            );
        }
        let previous = machine.state();
        let to = machine.transition(Event::Stop)?;
        let mut tasks = lock(&self.tasks);
        tasks.on_transition(to);
        let driver = tasks.driver.take();
        drop(tasks);
        self.messages.cancel();
        self.state_tx.send_replace(to);
        drop(machine);

        info!(
            worker_id = self.worker_id(),
            from = %previous,
            %to,
            event = %Event::Stop,
            "Worker state changed"
        );
        Ok(driver)
    }

    fn complete_stop(&self) -> Result<(), FsmError> {
        let mut machine = lock(&self.machine);
        machine.complete_stop()?;
        self.state_tx.send_replace(State::Stopped);
        Ok(())
    }

    fn connection(&self) -> Option<E::Handle> {
        lock(&self.connection).clone()
    }

    async fn store_call<T>(
        &self,
        phase: Phase,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LifecycleError> {
        match timeout(self.config.request_timeout, call).await {
            Ok(result) => result.map_err(|e| phase.store_failure(e)),
            Err(_) => Err(phase.timeout(self.config.request_timeout)),
        }
    }

    async fn engine_call<T>(
        &self,
        call: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, LifecycleError> {
        match timeout(self.config.request_timeout, call).await {
            Ok(result) => result.map_err(engine_failure),
            Err(_) => Err(LifecycleError::ConnectionTimeout(self.config.request_timeout)),
        }
    }

    async fn register(&self, identity: &WorkerIdentity) -> Result<Event, LifecycleError> {
        let registration = self
            .store_call(Phase::Registration, self.store.register(identity))
            .await?;
        if registration.approved {
            Ok(Event::Registered)
        } else {
            info!(worker_id = identity.worker_id(), "Registered, waiting for approval");
            Ok(Event::WaitApproval)
        }
    }

    async fn await_approval(
        &self,
        identity: &Arc<WorkerIdentity>,
    ) -> Result<Event, LifecycleError> {
        let (tx, mut rx) = mpsc::channel::<Result<(), LifecycleError>>(1);
        let store = Arc::clone(&self.store);
        let identity = Arc::clone(identity);
        let request_timeout = self.config.request_timeout;
        let period = self.config.approval_poll_interval;

        let poll = PeriodicTask::spawn(
            "approval-poll",
            tokio::time::interval_at(Instant::now() + period, period),
            move || {
                let store = Arc::clone(&store);
                let identity = Arc::clone(&identity);
                let tx = tx.clone();
                async move {
                    let answer = timeout(request_timeout, store.check_approval(&identity))
                        .await
                        .unwrap_or(Err(StoreError::Timeout(request_timeout)));
                    match answer {
                        Ok(true) => {
                            let _ = tx.send(Ok(())).await;
                            ControlFlow::Break(())
                        }
                        Ok(false) => {
                            debug!(worker_id = identity.worker_id(), "Approval still pending");
                            ControlFlow::Continue(())
                        }
                        Err(StoreError::Denied(reason)) => {
                            let _ = tx
                                .send(Err(LifecycleError::RegistrationRejected(reason)))
                                .await;
                            ControlFlow::Break(())
                        }
                        Err(e) => {
                            warn!(
                                worker_id = identity.worker_id(),
                                error = %e,
                                "Approval check failed, retrying"
                            );
                            ControlFlow::Continue(())
                        }
                    }
                }
            },
        );
        lock(&self.tasks).approval_poll = Some(poll);

        match timeout(self.config.approval_timeout, rx.recv()).await {
            Ok(Some(Ok(()))) => Ok(Event::Approved),
            Ok(Some(Err(error))) => Err(error),
            Ok(None) => Err(LifecycleError::Store(
                "approval poll ended without an answer".to_string(),
            )),
            Err(_) => Err(LifecycleError::ApprovalTimeout(self.config.approval_timeout)),
        }
    }

    async fn connect(&self, identity: &Arc<WorkerIdentity>) -> Result<Event, LifecycleError> {
        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.store),
            Arc::clone(identity),
            self.config.heartbeat_interval,
            self.config.request_timeout,
        );
        lock(&self.tasks).heartbeat = Some(heartbeat);

        let stale = lock(&self.connection).take();
        if let Some(stale) = stale {
            if let Err(e) = self.engine_call(self.engine.disconnect(stale)).await {
                debug!(error = %e, "Closing previous engine connection failed");
            }
        }

        let handle = self
            .engine_call(self.engine.connect(&self.config.working_dir))
            .await?;
        *lock(&self.connection) = Some(handle.clone());

        let capabilities = self.engine_call(self.engine.capabilities(&handle)).await?;
        self.store_call(
            Phase::Connection,
            self.store.publish_capabilities(identity, &capabilities),
        )
        .await?;
        info!(
            worker_id = identity.worker_id(),
            capabilities = capabilities.len(),
            "Engine connected, capabilities published"
        );
        Ok(Event::Connected)
    }

    /// Reconcile sessions once on entering `Ready`.
    ///
    /// Only a lost engine connection is returned; other failures are logged.
    async fn initial_sync(&self) -> Result<(), LifecycleError> {
        let Some(handle) = self.connection() else {
            return Ok(());
        };
        match sync_once(
            &*self.store,
            &*self.engine,
            &handle,
            self.config.request_timeout,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => match lost_connection(&e) {
                Some(error) => Err(error),
                None => {
                    warn!(worker_id = self.worker_id(), error = %e, "Initial session sync failed");
                    Ok(())
                }
            },
        }
    }

    /// Start the periodic session sync owned by `Ready`.
    fn enter_ready(self: &Arc<Self>) {
        let (Some(period), Some(handle)) = (self.config.sync_interval, self.connection()) else {
            return;
        };
        let store = Arc::clone(&self.store);
        let engine = Arc::clone(&self.engine);
        let shared = Arc::downgrade(self);
        let request_timeout = self.config.request_timeout;

        let task = PeriodicTask::spawn(
            "session-sync",
            tokio::time::interval_at(Instant::now() + period, period),
            move || {
                let store = Arc::clone(&store);
                let engine = Arc::clone(&engine);
                let shared = Weak::clone(&shared);
                let handle = handle.clone();
                async move {
                    let Err(e) = sync_once(&*store, &*engine, &handle, request_timeout).await else {
                        return ControlFlow::Continue(());
                    };
                    match lost_connection(&e) {
                        Some(error) => {
                            if let Some(shared) = shared.upgrade() {
                                shared.connection_lost(error);
                            }
                            ControlFlow::Break(())
                        }
                        None => {
                            warn!(error = %e, "Session sync failed");
                            ControlFlow::Continue(())
                        }
                    }
                }
            },
        );

        let machine = lock(&self.machine);
        if machine.state() == State::Ready {
            lock(&self.tasks).session_sync = Some(task);
        }
    }

    /// Move `Ready -> Error` after the engine connection was lost and start a
    /// new driver to recover from it.
    ///
    /// Does nothing unless the worker is `Ready`.
    fn connection_lost(self: &Arc<Self>, error: LifecycleError) {
        let Some(identity) = self.identity.get().cloned() else {
            return;
        };
        let mut machine = lock(&self.machine);
        if machine.state() != State::Ready {
            return;
        }
        machine.set_error(error.clone());
        let Ok(to) = machine.transition(Event::Error) else {
            return;
        };
        let mut tasks = lock(&self.tasks);
        tasks.on_transition(to);
        if let Some((previous, _)) = tasks.driver.replace(self.spawn_driver(identity)) {
            previous.cancel();
        }
        drop(tasks);
        self.state_tx.send_replace(to);
        drop(machine);

        warn!(worker_id = self.worker_id(), error = %error, "Engine connection lost");
        info!(
            worker_id = self.worker_id(),
            from = %State::Ready,
            %to,
            event = %Event::Error,
            "Worker state changed"
        );
    }

    fn spawn_driver(self: &Arc<Self>, identity: Arc<WorkerIdentity>) -> Driver {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {
                    debug!(worker_id = identity.worker_id(), "Lifecycle driver cancelled");
                }
                () = shared.drive(Arc::clone(&identity)) => {}
            }
        });
        (token, handle)
    }

    /// Delay before recovering from the current error, or `None` if it is fatal.
    fn recovery_delay(&self, backoff: &mut Backoff) -> Option<Duration> {
        let machine = lock(&self.machine);
        match machine.error() {
            Some(error) if error.is_recoverable() => Some(backoff.next_delay()),
            Some(error) => {
                warn!(
                    worker_id = self.worker_id(),
                    error = %error,
                    "Fatal lifecycle error, waiting for stop"
                );
                None
            }
            None => None,
        }
    }

    /// Run lifecycle phases until `Ready`, a fatal error, or shutdown.
    async fn drive(self: &Arc<Self>, identity: Arc<WorkerIdentity>) {
        let mut backoff = Backoff::new(self.config.recovery_backoff.clone());
        loop {
            let step = match self.state() {
                State::Registering => self.register(&identity).await,
                State::WaitingApproval => self.await_approval(&identity).await,
                State::Connecting => self.connect(&identity).await,
                State::Ready => {
                    backoff.reset();
                    match self.initial_sync().await {
                        Ok(()) => {
                            self.enter_ready();
                            return;
                        }
                        Err(error) => Err(error),
                    }
                }
                State::Error => {
                    let Some(delay) = self.recovery_delay(&mut backoff) else {
                        return;
                    };
                    info!(
                        worker_id = identity.worker_id(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Scheduling recovery"
                    );
                    tokio::time::sleep(delay).await;
                    if self.state() != State::Error {
                        return;
                    }
                    Ok(Event::Recover)
                }
                State::Uninitialized | State::Stopping | State::Stopped => return,
            };

            let fired = match step {
                Ok(event) => self.fire(event, None),
                Err(error) => self.fail(error),
            };
            if let Err(e) = fired {
                error!(worker_id = identity.worker_id(), error = %e, "Lifecycle driver halted");
                return;
            }
        }
    }
}

async fn join_driver(driver: Option<Driver>, failures: &mut Vec<ShutdownFailure>) {
    let Some((token, handle)) = driver else {
        return;
    };
    token.cancel();
    if let Err(e) = handle.await {
        failures.push(ShutdownFailure {
            step: "lifecycle_driver",
            error: e.to_string(),
        });
    }
}

/// The lifecycle error for `error` if it means the engine connection is gone.
fn lost_connection(error: &WorkerError) -> Option<LifecycleError> {
    match error {
        WorkerError::Engine(e) if e.is_connection_lost() => {
            Some(LifecycleError::Engine(e.to_string()))
        }
        _ => None,
    }
}

async fn sync_once<S, E>(
    store: &S,
    engine: &E,
    handle: &E::Handle,
    request_timeout: Duration,
) -> Result<SyncResult, WorkerError>
where
    S: RemoteStore + ?Sized,
    E: ExecutionEngine + ?Sized,
{
    let local = timeout(request_timeout, engine.list_sessions(handle))
        .await
        .map_err(|_| EngineError::Timeout(request_timeout))??;
    Ok(reconcile(&local, store).await?)
}

/// A fleet worker driving one execution engine.
pub struct Worker<S, E>
where
    S: RemoteStore + 'static,
    E: ExecutionEngine + 'static,
{
    shared: Arc<Shared<S, E>>,
    /// Serialises `start` and `stop`.
    lifecycle: tokio::sync::Mutex<()>,
}

impl<S, E> Worker<S, E>
where
    S: RemoteStore + 'static,
    E: ExecutionEngine + 'static,
{
    /// Create a worker in `Uninitialized`.
    #[must_use]
    pub fn new(config: WorkerConfig, store: Arc<S>, engine: Arc<E>) -> Self {
        let machine = StateMachine::new(config.history_capacity);
        let (state_tx, _) = watch::channel(machine.state());
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                engine,
                identity: OnceLock::new(),
                machine: Mutex::new(machine),
                state_tx,
                tasks: Mutex::new(Tasks::default()),
                connection: Mutex::new(None),
                messages: CancellationToken::new(),
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Start the lifecycle with `identity`.
    ///
    /// Returns once `Start` has been accepted; the phases run in the
    /// background. Use [`subscribe`](Self::subscribe) to wait for a state.
    ///
    /// # Errors
    /// Returns [`FsmError::InvalidTransition`] if the worker was already started.
    pub async fn start(&self, identity: WorkerIdentity) -> Result<(), WorkerError> {
        let _guard = self.lifecycle.lock().await;
        self.shared.fire(Event::Start, None)?;

        let identity = Arc::clone(self.shared.identity.get_or_init(|| Arc::new(identity)));
        let driver = self.shared.spawn_driver(identity);
        lock(&self.shared.tasks).driver = Some(driver);
        Ok(())
    }

    /// Shut the worker down.
    ///
    /// Cancels the running phase and every owned task, closes the engine
    /// connection and marks the worker offline, then completes to `Stopped`.
    /// Every cleanup step is attempted even if an earlier one failed. A call
    /// on a worker that is already stopping or stopped does nothing.
    ///
    /// # Errors
    /// Returns [`FsmError::InvalidTransition`] if the worker was never
    /// started, or [`WorkerError::Shutdown`] listing every failed cleanup
    /// step. The worker is `Stopped` in the latter case.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        let _guard = self.lifecycle.lock().await;
        match self.shared.state() {
            State::Stopping | State::Stopped => return Ok(()),
            State::Uninitialized => {
                return Err(FsmError::InvalidTransition {
                    from: State::Uninitialized,
                    event: Event::Stop,
                }
                .into());
            }
            _ => {}
        }

        let mut failures = Vec::new();
        let driver = lock(&self.shared.tasks).driver.take();
        join_driver(driver, &mut failures).await;
        // a lost connection may have started another driver in the meantime
        let driver = self.shared.begin_stop()?;
        join_driver(driver, &mut failures).await;

        let periodic = lock(&self.shared.tasks).take_periodic();
        for task in periodic {
            let name = task.name();
            if let Err(e) = task.shutdown().await {
                failures.push(ShutdownFailure {
                    step: name,
                    error: e.to_string(),
                });
            }
        }

        let request_timeout = self.shared.config.request_timeout;
        let connection = lock(&self.shared.connection).take();
        if let Some(handle) = connection {
            let closed = timeout(request_timeout, self.shared.engine.disconnect(handle))
                .await
                .unwrap_or(Err(EngineError::Timeout(request_timeout)));
            if let Err(e) = closed {
                failures.push(ShutdownFailure {
                    step: "disconnect",
                    error: e.to_string(),
                });
            }
        }

        if let Some(identity) = self.shared.identity.get() {
            let offline = timeout(request_timeout, self.shared.store.set_offline(identity))
                .await
                .unwrap_or(Err(StoreError::Timeout(request_timeout)));
            if let Err(e) = offline {
                failures.push(ShutdownFailure {
                    step: "set_offline",
                    error: e.to_string(),
                });
            }
        }

        self.shared.complete_stop()?;
        if failures.is_empty() {
            info!(worker_id = self.shared.worker_id(), "Worker stopped");
            Ok(())
        } else {
            warn!(
                worker_id = self.shared.worker_id(),
                failed_steps = failures.len(),
                "Worker stopped with cleanup failures"
            );
            Err(WorkerError::Shutdown(ShutdownError { failures }))
        }
    }

    /// Relay `message` to the engine and stream its output to the store.
    ///
    /// May be called concurrently for different messages; chunks of one
    /// message are written in sequence order.
    ///
    /// # Errors
    /// Returns [`FsmError::StateMismatch`] unless the worker is `Ready`,
    /// [`WorkerError::Cancelled`] if shutdown begins mid-message, or the
    /// engine/store error that aborted the relay.
    pub async fn process_message(
        &self,
        message: &InboundMessage,
    ) -> Result<MessageOutcome, WorkerError> {
        lock(&self.shared.machine).assert_state(State::Ready)?;
        let handle = self.shared.connection().ok_or(WorkerError::NotConnected)?;
        let cancelled = self.shared.messages.clone();

        let outcome = tokio::select! {
            biased;
            () = cancelled.cancelled() => Err(WorkerError::Cancelled),
            outcome = message::relay(
                &*self.shared.store,
                &*self.shared.engine,
                &handle,
                message,
                self.shared.config.request_timeout,
            ) => outcome,
        };
        self.check_connection(outcome)
    }

    /// Reconcile the engine's sessions with the stored records now.
    ///
    /// # Errors
    /// Returns [`FsmError::StateMismatch`] unless the worker is `Ready`, or
    /// the error that prevented the sync from running.
    pub async fn sync_sessions(&self) -> Result<SyncResult, WorkerError> {
        lock(&self.shared.machine).assert_state(State::Ready)?;
        let handle = self.shared.connection().ok_or(WorkerError::NotConnected)?;
        let synced = sync_once(
            &*self.shared.store,
            &*self.shared.engine,
            &handle,
            self.shared.config.request_timeout,
        )
        .await;
        self.check_connection(synced)
    }

    /// Move to `Error` and start recovering if `outcome` lost the engine.
    fn check_connection<T>(&self, outcome: Result<T, WorkerError>) -> Result<T, WorkerError> {
        if let Err(e) = &outcome {
            if let Some(lost) = lost_connection(e) {
                self.shared.connection_lost(lost);
            }
        }
        outcome
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.shared.state()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == State::Ready
    }

    #[must_use]
    pub fn previous_state(&self) -> Option<State> {
        lock(&self.shared.machine).previous_state()
    }

    /// Retained transitions, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TransitionRecord> {
        lock(&self.shared.machine).history()
    }

    /// The error captured by the last failed phase, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<LifecycleError> {
        lock(&self.shared.machine).error().cloned()
    }

    /// Receiver observing every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.shared.state_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }
}

impl<S, E> Drop for Worker<S, E>
where
    S: RemoteStore + 'static,
    E: ExecutionEngine + 'static,
{
    fn drop(&mut self) {
        let mut tasks = lock(&self.shared.tasks);
        if let Some((token, _)) = tasks.driver.take() {
            token.cancel();
        }
        drop(tasks.take_periodic());
        self.shared.messages.cancel();
    }
}
