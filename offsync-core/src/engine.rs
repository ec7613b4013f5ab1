//! Engine facade.
//!
//! [`SyncEngine`] owns the action log, the mirror and the observable state,
//! and wires the network monitor to the scheduler. Callers construct it
//! explicitly with [`SyncEngine::initialize`] and tear it down with
//! [`SyncEngine::shutdown`]; there is no global instance.

use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::action::{ActionKind, NewAction, PendingAction, Priority};
use crate::config::EngineConfig;
use crate::db::init_db;
use crate::error::SyncError;
use crate::executor::{SyncExecutor, SyncReport};
use crate::network::{ConnectivityProbe, NetworkMonitor};
use crate::remote::RemoteService;
use crate::scheduler::{SchedulerState, SyncScheduler};
use crate::state::{StateStore, SyncState, SyncStateHandle, SyncStateUpdate};

pub struct SyncEngine<R> {
    pool: SqlitePool,
    config: EngineConfig,
    executor: Arc<SyncExecutor<R>>,
    scheduler: Arc<SyncScheduler<R>>,
    monitor: NetworkMonitor,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteService + 'static> SyncEngine<R> {
    /// Opens local storage, restores persisted state, and starts following
    /// `monitor`.
    ///
    /// The scheduler starts right away if the monitor reports online. A
    /// persisted `in_progress` flag is always cleared.
    pub async fn initialize(
        config: EngineConfig,
        remote: Arc<R>,
        monitor: NetworkMonitor,
        credential: Option<String>,
    ) -> Result<Self, SyncError> {
        let pool = init_db(&config.database_path).await?;

        let persisted = StateStore::new(pool.clone()).load().await.unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable persisted sync state: {}", e);
            None
        });
        // Subscribe before reading so a flip during startup reaches the listener
        let mut network_rx = monitor.subscribe();
        let online = *network_rx.borrow_and_update();

        let state = Arc::new(SyncStateHandle::restore(persisted));
        state.update(SyncStateUpdate {
            online: Some(online),
            ..Default::default()
        });

        if credential.is_some() {
            remote.set_auth_token(credential);
        }

        let executor = Arc::new(SyncExecutor::new(
            remote,
            pool.clone(),
            state.clone(),
            &config,
        ));
        executor.refresh_pending_count().await?;

        let scheduler = Arc::new(SyncScheduler::new(executor.clone(), config.sync_interval));
        if config.background_sync && online {
            scheduler.start();
        }

        let listener = spawn_network_listener(
            network_rx,
            state,
            config.background_sync.then(|| scheduler.clone()),
        );

        tracing::info!(
            database = %config.database_path.display(),
            online,
            "sync engine initialized"
        );

        Ok(Self {
            pool,
            config,
            executor,
            scheduler,
            monitor,
            tasks: Mutex::new(vec![listener]),
        })
    }

    /// Feeds `probe` results into the network monitor every `probe_interval`.
    pub fn spawn_probe<P: ConnectivityProbe>(&self, probe: P) {
        let handle = self.monitor.spawn_probe(probe, self.config.probe_interval);
        self.lock_tasks().push(handle);
    }

    /// Queues a mutation and returns its action id.
    pub async fn enqueue_mutation(
        &self,
        kind: ActionKind,
        entity_type: &str,
        entity_id: Option<&str>,
        payload: serde_json::Value,
        priority: Option<Priority>,
    ) -> Result<String, SyncError> {
        let action = NewAction {
            kind,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            payload,
            priority: priority.unwrap_or_default(),
        };
        let pending = self.executor.log().enqueue(&action).await?;
        self.executor.refresh_pending_count().await?;
        Ok(pending.id)
    }

    /// Runs one drain pass. Remote failures are reported, not returned.
    pub async fn run_sync_pass(&self) -> Result<SyncReport, SyncError> {
        self.executor.run_sync_pass().await
    }

    /// Pulls every tracked collection, then drains the queue.
    pub async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        self.executor.run_full_sync().await
    }

    pub fn get_sync_state(&self) -> SyncState {
        self.executor.state().get()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.executor.state().subscribe()
    }

    pub async fn get_collection(&self, entity_type: &str) -> Result<Vec<serde_json::Value>, SyncError> {
        self.executor.mirror().get(entity_type).await
    }

    /// Queued actions in drain order.
    pub async fn pending_actions(&self) -> Result<Vec<PendingAction>, SyncError> {
        self.executor.log().list_retriable().await
    }

    /// Empties the mirrored collections. Queued mutations are kept.
    pub async fn clear_offline_data(&self) -> Result<(), SyncError> {
        self.executor.mirror().clear_all().await
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        self.executor.remote().set_auth_token(token);
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.monitor
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Stops scheduling, waits for a running pass, saves state and closes
    /// the database.
    pub async fn shutdown(self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        if let Some(task) = self.scheduler.stop() {
            if let Err(e) = task.await {
                tracing::warn!("scheduler task ended abnormally: {}", e);
            }
        }
        self.executor.persist_state().await;
        self.pool.close().await;
        tracing::info!("sync engine shut down");
    }
}

impl<R> SyncEngine<R> {
    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Dropping without [`SyncEngine::shutdown`] stops background work but does
/// not wait for a running pass or persist the final state.
impl<R> Drop for SyncEngine<R> {
    fn drop(&mut self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        if self.scheduler.stop().is_some() {
            tracing::debug!("sync engine dropped without shutdown");
        }
    }
}

/// Mirrors connectivity into the sync state and, when given a scheduler,
/// starts or suspends it.
///
/// Transitions are handled one at a time in this task, so rapid flips only
/// ever produce start/stop calls in order, never overlapping ones.
fn spawn_network_listener<R: RemoteService + 'static>(
    mut rx: watch::Receiver<bool>,
    state: Arc<SyncStateHandle>,
    scheduler: Option<Arc<SyncScheduler<R>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            state.update(SyncStateUpdate {
                online: Some(online),
                ..Default::default()
            });
            let Some(scheduler) = &scheduler else {
                continue;
            };
            if online {
                scheduler.start();
            } else {
                // Detach: a running pass finishes on its own
                scheduler.stop();
            }
        }
    })
}
