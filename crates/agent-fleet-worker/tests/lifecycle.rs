//! Lifecycle tests driving a worker against the in-memory store.

mod support;

use std::{sync::Arc, time::Duration};

use agent_fleet_core::{
    ApprovalStatus, EngineError, Event, FsmError, LifecycleError, OperationalStatus, State,
    StoreError,
};
use agent_fleet_store::{MemoryStore, StoreOp};
use agent_fleet_worker::WorkerError;
use support::{ScriptedEngine, identity, settle, visited, wait_for, worker};
use tokio_test::{assert_err, assert_ok};

#[tokio::test(start_paused = true)]
async fn test_auto_approved_worker_becomes_ready() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;
    settle().await;

    assert!(worker.is_ready());
    assert_eq!(
        visited(&worker),
        vec![
            State::Uninitialized,
            State::Registering,
            State::Connecting,
            State::Ready
        ]
    );
    let record = store.worker("w-1").unwrap();
    assert_eq!(record.approval_status, ApprovalStatus::Approved);
    assert_eq!(record.operational_status, OperationalStatus::Online);
    assert!(record.last_heartbeat.is_some());
    let names: Vec<_> = store.capabilities("w-1").into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["chat", "edit"]);
    assert_eq!(engine.connects(), 1);

    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_approval() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::WaitingApproval).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(worker.state(), State::WaitingApproval);
    assert!(store.call_count(StoreOp::CheckApproval) >= 4);
    assert_eq!(engine.connects(), 0);

    assert!(store.approve("w-1"));
    wait_for(&worker, State::Ready).await;

    assert_eq!(
        visited(&worker),
        vec![
            State::Uninitialized,
            State::Registering,
            State::WaitingApproval,
            State::Connecting,
            State::Ready
        ]
    );
    assert_eq!(worker.last_error(), None);
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_approval_check_errors_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);
    store.inject_failure(
        StoreOp::CheckApproval,
        StoreError::Rejected("rate limited".into()),
    );

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::WaitingApproval).await;
    assert!(store.approve("w-1"));
    wait_for(&worker, State::Ready).await;

    assert!(!visited(&worker).contains(&State::Error));
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_while_waiting_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::WaitingApproval).await;
    assert!(store.reject("w-1"));
    wait_for(&worker, State::Error).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(worker.state(), State::Error);
    assert!(matches!(
        worker.last_error(),
        Some(LifecycleError::RegistrationRejected(_))
    ));

    // the store no longer knows the worker, so going offline fails
    let err = assert_err!(worker.stop().await);
    let WorkerError::Shutdown(shutdown) = err else {
        panic!("expected shutdown error, got {err:?}");
    };
    assert_eq!(shutdown.failures.len(), 1);
    assert_eq!(shutdown.failures[0].step, "set_offline");
    assert_eq!(worker.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_approval_timeout_recovers_by_registering_again() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Error).await;
    assert_eq!(
        worker.last_error(),
        Some(LifecycleError::ApprovalTimeout(Duration::from_secs(60)))
    );

    wait_for(&worker, State::WaitingApproval).await;
    assert_eq!(worker.last_error(), None);
    assert_eq!(store.call_count(StoreOp::Register), 2);
    assert!(
        worker
            .history()
            .iter()
            .any(|r| r.event == Event::Recover && r.to == State::Registering)
    );
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_from_connect_failure() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    engine.fail_next_connect(EngineError::ConnectionFailed("refused".into()));
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;

    assert_eq!(
        visited(&worker),
        vec![
            State::Uninitialized,
            State::Registering,
            State::Connecting,
            State::Error,
            State::Registering,
            State::Connecting,
            State::Ready
        ]
    );
    let history = worker.history();
    let failed = history.iter().find(|r| r.to == State::Error).unwrap();
    assert!(matches!(failed.error, Some(LifecycleError::Engine(_))));
    let recovered = history.iter().find(|r| r.event == Event::Recover).unwrap();
    assert!(recovered.error.is_some());
    assert_eq!(worker.last_error(), None);
    assert_eq!(engine.connects(), 2);

    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_recoverable() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    engine.hang_next_connect();
    let worker = worker(&store, &engine);

    let started = tokio::time::Instant::now();
    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Error).await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(
        worker.last_error(),
        Some(LifecycleError::ConnectionTimeout(Duration::from_secs(5)))
    );

    wait_for(&worker, State::Ready).await;
    let history = worker.history();
    let recovered = history.iter().find(|r| r.event == Event::Recover).unwrap();
    assert_eq!(
        recovered.error,
        Some(LifecycleError::ConnectionTimeout(Duration::from_secs(5)))
    );
    assert_eq!(engine.connects(), 2);
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_register_timeout_is_recoverable() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    store.stall_next(StoreOp::Register);
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Error).await;

    assert_eq!(
        worker.last_error(),
        Some(LifecycleError::ApprovalTimeout(Duration::from_secs(5)))
    );
    assert_eq!(engine.connects(), 0);

    wait_for(&worker, State::Ready).await;
    assert_eq!(
        visited(&worker),
        vec![
            State::Uninitialized,
            State::Registering,
            State::Error,
            State::Registering,
            State::Connecting,
            State::Ready
        ]
    );
    assert_eq!(store.call_count(StoreOp::Register), 2);
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_backoff_grows() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    for _ in 0..3 {
        engine.fail_next_connect(EngineError::ConnectionFailed("refused".into()));
    }
    let worker = worker(&store, &engine);

    let started = tokio::time::Instant::now();
    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;

    // 1s + 2s + 4s of backoff between the four attempts
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert_eq!(engine.connects(), 4);
    assert_ok!(worker.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_denied_registration_is_fatal() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    store.inject_failure(StoreOp::Register, StoreError::Denied("unknown worker".into()));
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Error).await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(worker.state(), State::Error);
    assert_eq!(store.call_count(StoreOp::Register), 1);
    assert_eq!(
        worker.last_error(),
        Some(LifecycleError::RegistrationRejected(
            "unknown worker".into()
        ))
    );

    // never registered, so going offline fails too
    assert_err!(worker.stop().await);
    assert_eq!(worker.state(), State::Stopped);
    // the error survives shutdown for inspection
    assert!(worker.last_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_ready() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);
    let mut states = worker.subscribe();

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;
    settle().await;

    assert_ok!(worker.stop().await);
    assert_eq!(worker.state(), State::Stopped);
    assert_eq!(*states.borrow_and_update(), State::Stopped);

    let last = worker.history().pop().unwrap();
    assert_eq!(
        (last.from, last.event, last.to),
        (State::Ready, Event::Stop, State::Stopping)
    );
    assert_eq!(
        store.worker("w-1").unwrap().operational_status,
        OperationalStatus::Offline
    );
    assert_eq!(store.machine_status("mac-1"), Some(OperationalStatus::Offline));
    assert_eq!(engine.disconnects(), 1);

    let heartbeats = store.call_count(StoreOp::SendHeartbeat);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(store.call_count(StoreOp::SendHeartbeat), heartbeats);
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_is_noop() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;
    assert_ok!(worker.stop().await);
    let recorded = worker.history().len();

    assert_ok!(worker.stop().await);
    assert_eq!(worker.history().len(), recorded);
    assert_eq!(store.call_count(StoreOp::SetOffline), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_waiting_for_approval() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::WaitingApproval).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_ok!(worker.stop().await);
    assert_eq!(worker.state(), State::Stopped);
    assert!(
        worker
            .history()
            .iter()
            .any(|r| r.from == State::WaitingApproval && r.to == State::Stopping)
    );

    let checks = store.call_count(StoreOp::CheckApproval);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.call_count(StoreOp::CheckApproval), checks);
    assert_eq!(engine.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_connecting() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    engine.hang_next_connect();
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Connecting).await;
    settle().await;

    assert_ok!(worker.stop().await);
    assert_eq!(worker.state(), State::Stopped);
    assert_eq!(
        worker.last_error(),
        Some(LifecycleError::Interrupted(State::Connecting))
    );
    assert_eq!(
        visited(&worker),
        vec![
            State::Uninitialized,
            State::Registering,
            State::Connecting,
            State::Error,
            State::Stopping
        ]
    );
    // never connected, so nothing to disconnect
    assert_eq!(engine.disconnects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_failures_are_aggregated() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;
    engine.fail_disconnect(EngineError::Internal("broken pipe".into()));
    store.inject_failure(StoreOp::SetOffline, StoreError::Internal("unavailable".into()));

    let err = assert_err!(worker.stop().await);
    let WorkerError::Shutdown(shutdown) = err else {
        panic!("expected shutdown error, got {err:?}");
    };
    let steps: Vec<_> = shutdown.failures.iter().map(|f| f.step).collect();
    assert_eq!(steps, vec!["disconnect", "set_offline"]);
    assert_eq!(worker.state(), State::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_is_rejected() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    let err = assert_err!(worker.stop().await);
    assert!(matches!(
        err,
        WorkerError::Fsm(FsmError::InvalidTransition {
            from: State::Uninitialized,
            event: Event::Stop
        })
    ));
    assert_eq!(worker.state(), State::Uninitialized);
    assert!(worker.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let store = Arc::new(MemoryStore::auto_approving());
    let engine = Arc::new(ScriptedEngine::default());
    let worker = worker(&store, &engine);

    assert_ok!(worker.start(identity()).await);
    wait_for(&worker, State::Ready).await;

    let err = assert_err!(worker.start(identity()).await);
    assert!(matches!(
        err,
        WorkerError::Fsm(FsmError::InvalidTransition {
            from: State::Ready,
            event: Event::Start
        })
    ));
    assert_ok!(worker.stop().await);
}
