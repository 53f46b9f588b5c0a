//! Store side of the fleet.
//!
//! Provides:
//! - `MemoryStore` - In-memory `RemoteStore` + `WorkerRegistry` with admin actions
//! - `StalenessSweeper` - Periodic job demoting workers whose heartbeat went stale

pub mod config;
pub mod memory;
pub mod sweep;

pub use config::SweepConfig;
pub use memory::{MemoryStore, StoreOp};
pub use sweep::{StalenessSweeper, SweepError, SweepFailure, SweepReport};
