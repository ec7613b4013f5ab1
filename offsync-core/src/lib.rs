//! Offsync Core Library
//!
//! Offline-first synchronization: a durable queue of entity mutations that is
//! replayed against a REST service when connectivity allows, plus a local
//! mirror of remote collections for offline reads.

pub mod action;
pub mod action_log;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod mirror;
pub mod network;
pub mod remote;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod testing;

pub use action::{ActionKind, NewAction, PendingAction, Priority, DEFAULT_ATTEMPT_LIMIT};
pub use action_log::ActionLog;
pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{RemoteError, SyncError, SyncResult};
pub use executor::{PulledCollection, SyncExecutor, SyncReport};
pub use mirror::MirrorStore;
pub use network::{ConnectivityProbe, HttpProbe, NetworkMonitor};
pub use remote::{HttpRemote, RemoteService};
pub use scheduler::{SchedulerState, SyncScheduler};
pub use state::{SyncState, SyncStateHandle, SyncStateUpdate};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
