//! Session reconciliation for agent workers.
//!
//! Provides:
//! - `calculate_sync_plan` - Pure diff of engine sessions against stored records
//! - `execute_sync` - Concurrent, failure-tolerant application of a plan
//! - `reconcile` - List, plan, verify and execute in one call

pub mod executor;
pub mod plan;

pub use executor::{SyncError, SyncFailure, SyncResult, execute_sync, reconcile};
pub use plan::{
    SessionCreation, SessionDeletion, SessionRename, SyncOperation, SyncPlan, apply_plan,
    calculate_sync_plan, is_convergent,
};
