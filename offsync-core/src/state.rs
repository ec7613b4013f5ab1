//! Observable sync state.
//!
//! A single [`SyncStateHandle`] is shared by the engine's components. Reads
//! are snapshots, writes merge the provided fields, and subscribers are
//! notified through a `tokio::sync::watch` channel. Neither reads nor writes
//! touch storage; persistence is a separate, explicit step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::action_log::format_timestamp;
use crate::error::SyncError;

/// Snapshot of the engine's synchronization status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// Last connectivity reported by the network monitor.
    pub online: bool,
    /// True exactly while a pass is running.
    pub in_progress: bool,
    /// Completion time of the last pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Retriable actions left in the queue.
    pub pending_count: u64,
    /// Failures recorded by the last pass.
    pub failed_count: u64,
    /// Human-readable failures from the last pass.
    pub last_errors: Vec<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SyncStateUpdate {
    pub online: Option<bool>,
    pub in_progress: Option<bool>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_count: Option<u64>,
    pub failed_count: Option<u64>,
    pub last_errors: Option<Vec<String>>,
}

impl SyncState {
    fn apply(&mut self, update: SyncStateUpdate) -> bool {
        let before = self.clone();
        if let Some(online) = update.online {
            self.online = online;
        }
        if let Some(in_progress) = update.in_progress {
            self.in_progress = in_progress;
        }
        if let Some(ts) = update.last_sync_at {
            self.last_sync_at = Some(ts);
        }
        if let Some(count) = update.pending_count {
            self.pending_count = count;
        }
        if let Some(count) = update.failed_count {
            self.failed_count = count;
        }
        if let Some(errors) = update.last_errors {
            self.last_errors = errors;
        }
        *self != before
    }
}

/// Shared, thread-safe container for the current [`SyncState`].
#[derive(Debug)]
pub struct SyncStateHandle {
    tx: watch::Sender<SyncState>,
}

impl SyncStateHandle {
    pub fn new(initial: SyncState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Builds the handle from a persisted snapshot.
    ///
    /// A stored `in_progress = true` means the process died mid-pass; it is
    /// always discarded so the pass guard cannot stay locked.
    pub fn restore(persisted: Option<SyncState>) -> Self {
        let mut state = persisted.unwrap_or_default();
        if state.in_progress {
            tracing::warn!("previous sync pass did not finish, resetting in-progress flag");
        }
        state.in_progress = false;
        Self::new(state)
    }

    pub fn get(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    pub fn update(&self, update: SyncStateUpdate) {
        self.tx.send_if_modified(|state| state.apply(update));
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }

    /// Atomically claims the pass slot.
    ///
    /// Succeeds only when online and no other pass holds the slot; on success
    /// `in_progress` is set and the previous pass's errors are cleared.
    pub fn try_begin_pass(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.in_progress || !state.online {
                return false;
            }
            state.in_progress = true;
            state.last_errors.clear();
            true
        })
    }
}

/// Single-row persistence of the sync state snapshot.
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<Option<SyncState>, SyncError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT snapshot FROM sync_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((snapshot,)) => Ok(Some(serde_json::from_str(&snapshot)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, state: &SyncState) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (id, snapshot, saved_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET snapshot = excluded.snapshot, saved_at = excluded.saved_at
            "#,
        )
        .bind(serde_json::to_string(state)?)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
