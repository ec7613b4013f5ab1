//! Sync executor.
//!
//! A pass has up to two phases:
//!
//! 1. **Pull** (full sync only): for every tracked entity type, fetch what
//!    changed since the stored watermark and replace the mirrored collection.
//! 2. **Drain**: send every retriable queued action to the remote service in
//!    priority-then-FIFO order. Success removes the action; failure counts an
//!    attempt and, on the last one, drops it.
//!
//! At most one pass runs at a time and none runs while offline; the
//! `in_progress` flag in [`SyncStateHandle`] is the only lock. Remote failures
//! never abort a pass, they end up in the state's error list. Local storage
//! failures do abort it and are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::action::{ActionKind, PendingAction};
use crate::action_log::ActionLog;
use crate::config::EngineConfig;
use crate::error::{RemoteError, SyncError};
use crate::mirror::MirrorStore;
use crate::remote::RemoteService;
use crate::state::{StateStore, SyncStateHandle, SyncStateUpdate};

/// Number of entities pulled for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledCollection {
    pub entity_type: String,
    pub count: usize,
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// The pass did not run (another pass held the slot, or offline).
    pub skipped: bool,
    /// Actions accepted by the remote service.
    pub succeeded: usize,
    /// Actions whose call failed this pass.
    pub failed: usize,
    /// Failed actions that ran out of attempts and were removed.
    pub dropped: usize,
    pub pulled: Vec<PulledCollection>,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct SyncExecutor<R> {
    remote: Arc<R>,
    log: ActionLog,
    mirror: MirrorStore,
    state: Arc<SyncStateHandle>,
    state_store: StateStore,
    call_timeout: Duration,
    max_reported_errors: usize,
    entity_types: Vec<String>,
    /// Held from counting the log to publishing `pending_count`, so an older
    /// count never overwrites a newer one.
    pending_lock: tokio::sync::Mutex<()>,
}

impl<R: RemoteService> SyncExecutor<R> {
    pub fn new(
        remote: Arc<R>,
        pool: SqlitePool,
        state: Arc<SyncStateHandle>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            remote,
            log: ActionLog::new(pool.clone(), config.attempt_limit),
            mirror: MirrorStore::new(pool.clone()),
            state,
            state_store: StateStore::new(pool),
            call_timeout: config.call_timeout,
            max_reported_errors: config.max_reported_errors.max(1),
            entity_types: config.entity_types.clone(),
            pending_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn mirror(&self) -> &MirrorStore {
        &self.mirror
    }

    pub fn state(&self) -> &SyncStateHandle {
        &self.state
    }

    /// Drains the action queue once.
    ///
    /// Returns a skipped report when offline or when another pass is running.
    pub async fn run_sync_pass(&self) -> Result<SyncReport, SyncError> {
        if !self.state.try_begin_pass() {
            tracing::debug!("sync pass skipped: offline or already in progress");
            return Ok(SyncReport::skipped());
        }

        tracing::info!("sync pass started");
        let mut report = SyncReport::default();
        let outcome = self.drain(&mut report).await;
        self.finish_pass(report, outcome).await
    }

    /// Pulls every tracked collection, then drains the queue.
    ///
    /// Fails with [`SyncError::Offline`] when there is no connectivity.
    pub async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        if !self.state.get().online {
            return Err(SyncError::Offline);
        }
        if !self.state.try_begin_pass() {
            if !self.state.get().online {
                return Err(SyncError::Offline);
            }
            tracing::debug!("full sync skipped: a pass is already in progress");
            return Ok(SyncReport::skipped());
        }

        tracing::info!("full sync started");
        let mut report = SyncReport::default();
        let outcome = match self.pull(&mut report).await {
            Ok(()) => self.drain(&mut report).await,
            Err(e) => Err(e),
        };
        self.finish_pass(report, outcome).await
    }

    /// Refreshes `pending_count` from the log.
    pub async fn refresh_pending_count(&self) -> Result<u64, SyncError> {
        let _guard = self.pending_lock.lock().await;
        let pending = self.log.count_retriable().await?;
        self.state.update(SyncStateUpdate {
            pending_count: Some(pending),
            ..Default::default()
        });
        Ok(pending)
    }

    /// Saves the current state snapshot. Failures are logged, not returned.
    pub async fn persist_state(&self) {
        if let Err(e) = self.state_store.save(&self.state.get()).await {
            tracing::warn!("failed to persist sync state: {}", e);
        }
    }

    async fn drain(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let actions = self.log.list_retriable().await?;
        tracing::debug!(count = actions.len(), "draining action queue");

        for action in actions {
            match self.execute(&action).await {
                Ok(()) => {
                    self.log.remove(&action.id).await?;
                    report.succeeded += 1;
                    tracing::debug!(action_id = %action.id, "sent {}", action.label());
                }
                Err(e) => {
                    report.failed += 1;
                    let attempts = self.log.record_failure(&action.id).await?;
                    let line = match attempts {
                        Some(n) if n >= action.attempt_limit => {
                            report.dropped += 1;
                            tracing::error!(
                                action_id = %action.id,
                                "dropping {} after {} attempts: {}",
                                action.label(),
                                n,
                                e
                            );
                            format!("{}: {} (dropped after {} attempts)", action.label(), e, n)
                        }
                        _ => {
                            tracing::warn!(
                                action_id = %action.id,
                                attempt = attempts.unwrap_or(action.attempt + 1),
                                "{} failed: {}",
                                action.label(),
                                e
                            );
                            format!("{}: {}", action.label(), e)
                        }
                    };
                    report.errors.push(line);
                }
            }
        }

        Ok(())
    }

    async fn execute(&self, action: &PendingAction) -> Result<(), RemoteError> {
        let entity_type = action.entity_type.as_str();
        let call = async {
            match (action.kind, action.entity_id.as_deref()) {
                (ActionKind::Create, _) => self.remote.create(entity_type, &action.payload).await,
                (ActionKind::Update, Some(id)) => {
                    self.remote.update(entity_type, id, &action.payload).await
                }
                (ActionKind::Delete, Some(id)) => self.remote.delete(entity_type, id).await,
                (kind, None) => Err(RemoteError::Rejected(format!(
                    "{} without an entity id",
                    kind
                ))),
            }
        };

        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.call_timeout)))
    }

    async fn pull(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        for entity_type in self.tracked_entity_types().await? {
            let since = self.mirror.watermark(&entity_type).await?;
            let fetch = self.remote.fetch_since(&entity_type, since);

            let result = tokio::time::timeout(self.call_timeout, fetch)
                .await
                .unwrap_or(Err(RemoteError::Timeout(self.call_timeout)));

            match result {
                Ok(entities) => {
                    let as_of = Utc::now();
                    self.mirror.replace(&entity_type, &entities, as_of).await?;
                    tracing::debug!(entity_type = %entity_type, count = entities.len(), "pulled");
                    report.pulled.push(PulledCollection {
                        entity_type,
                        count: entities.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!("pull of {} failed: {}", entity_type, e);
                    report.errors.push(format!("{} PULL: {}", entity_type, e));
                }
            }
        }
        Ok(())
    }

    /// Configured types, then mirrored ones, then types with queued work.
    async fn tracked_entity_types(&self) -> Result<Vec<String>, SyncError> {
        let mut types = self.entity_types.clone();
        let known = self
            .mirror
            .entity_types()
            .await?
            .into_iter()
            .chain(self.log.entity_types().await?);
        for entity_type in known {
            if !types.contains(&entity_type) {
                types.push(entity_type);
            }
        }
        Ok(types)
    }

    /// Releases the pass slot and publishes the pass results.
    ///
    /// Runs even when the pass failed so `in_progress` is always cleared.
    async fn finish_pass(
        &self,
        mut report: SyncReport,
        outcome: Result<(), SyncError>,
    ) -> Result<SyncReport, SyncError> {
        if let Err(e) = &outcome {
            tracing::error!("sync pass aborted: {}", e);
            report.errors.push(format!("sync aborted: {}", e));
        }

        let mut last_errors = report.errors.clone();
        if last_errors.len() > self.max_reported_errors {
            let excess = last_errors.len() - self.max_reported_errors;
            last_errors.drain(..excess);
        }

        let pending = {
            let _guard = self.pending_lock.lock().await;
            let pending = self.log.count_retriable().await;
            self.state.update(SyncStateUpdate {
                in_progress: Some(false),
                last_sync_at: outcome.is_ok().then(Utc::now),
                pending_count: pending.as_ref().ok().copied(),
                failed_count: Some(report.errors.len() as u64),
                last_errors: Some(last_errors),
                ..Default::default()
            });
            pending
        };
        self.persist_state().await;

        outcome?;
        let pending = pending?;

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            pending,
            "sync pass finished"
        );

        Ok(report)
    }
}
