//! Periodic sync scheduling.
//!
//! The scheduler is a two-state machine:
//!
//! ```text
//!   SUSPENDED --start()/online--> ACTIVE   (one immediate pass, then every interval)
//!   ACTIVE    --stop()/offline--> SUSPENDED
//! ```
//!
//! Starting an active scheduler or stopping a suspended one does nothing, so
//! at most one timer task exists. Stopping never interrupts a running pass:
//! the task finishes its current pass and then exits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::executor::SyncExecutor;
use crate::remote::RemoteService;

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Suspended,
    Active,
}

enum Timer {
    Suspended,
    Active {
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
}

pub struct SyncScheduler<R> {
    executor: Arc<SyncExecutor<R>>,
    interval: Duration,
    timer: Mutex<Timer>,
}

impl<R: RemoteService + 'static> SyncScheduler<R> {
    pub fn new(executor: Arc<SyncExecutor<R>>, interval: Duration) -> Self {
        Self {
            executor,
            interval,
            timer: Mutex::new(Timer::Suspended),
        }
    }

    /// SUSPENDED -> ACTIVE. Runs one pass right away, then every interval.
    ///
    /// Returns false if the scheduler was already active.
    pub fn start(&self) -> bool {
        let mut timer = self.lock_timer();
        if matches!(*timer, Timer::Active { .. }) {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let executor = self.executor.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                // The pass runs outside the select so stopping cannot cancel it
                if let Err(e) = executor.run_sync_pass().await {
                    tracing::error!("scheduled sync pass failed: {}", e);
                }
            }
            tracing::debug!("scheduler task exited");
        });

        *timer = Timer::Active {
            stop: stop_tx,
            task,
        };
        tracing::info!(interval_secs = interval.as_secs(), "scheduler active");
        true
    }
}

impl<R> SyncScheduler<R> {
    pub fn state(&self) -> SchedulerState {
        match *self.lock_timer() {
            Timer::Suspended => SchedulerState::Suspended,
            Timer::Active { .. } => SchedulerState::Active,
        }
    }

    /// ACTIVE -> SUSPENDED.
    ///
    /// Returns the timer task so callers can wait for an in-flight pass to
    /// finish; `None` if the scheduler was already suspended.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let mut timer = self.lock_timer();
        match std::mem::replace(&mut *timer, Timer::Suspended) {
            Timer::Suspended => None,
            Timer::Active { stop, task } => {
                let _ = stop.send(());
                tracing::info!("scheduler suspended");
                Some(task)
            }
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Timer> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NewAction;
    use crate::config::EngineConfig;
    use crate::testing::{test_executor, FakeRemote};
    use serde_json::json;

    #[tokio::test]
    async fn test_start_twice_keeps_single_timer() {
        let remote = FakeRemote::new();
        let (executor, _temp) = test_executor(remote, EngineConfig::default()).await;
        let scheduler = SyncScheduler::new(executor, Duration::from_secs(30));

        assert_eq!(scheduler.state(), SchedulerState::Suspended);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert_eq!(scheduler.state(), SchedulerState::Active);

        let task = scheduler.stop().unwrap();
        task.await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Suspended);
        assert!(scheduler.stop().is_none());
    }

    #[tokio::test]
    async fn test_start_runs_immediate_pass() {
        let remote = FakeRemote::new();
        let (executor, _temp) = test_executor(remote.clone(), EngineConfig::default()).await;
        executor
            .log()
            .enqueue(&NewAction::create("leads", json!({"name": "Ada"})))
            .await
            .unwrap();
        let mut rx = executor.state().subscribe();
        let scheduler = SyncScheduler::new(executor.clone(), Duration::from_secs(3600));

        scheduler.start();

        // Wait for the pass to publish its completion
        rx.wait_for(|s| s.last_sync_at.is_some() && !s.in_progress)
            .await
            .unwrap();
        assert_eq!(remote.calls(), vec!["CREATE leads"]);

        scheduler.stop().unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_lets_running_pass_finish() {
        let remote = FakeRemote::new();
        remote.set_delay(Duration::from_millis(100));
        let (executor, _temp) = test_executor(remote.clone(), EngineConfig::default()).await;
        executor
            .log()
            .enqueue(&NewAction::delete("projects", "p1"))
            .await
            .unwrap();
        let mut rx = executor.state().subscribe();
        let scheduler = SyncScheduler::new(executor.clone(), Duration::from_secs(3600));

        scheduler.start();
        rx.wait_for(|s| s.in_progress).await.unwrap();

        scheduler.stop().unwrap().await.unwrap();

        let state = executor.state().get();
        assert!(!state.in_progress);
        assert_eq!(state.pending_count, 0);
        assert_eq!(remote.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_active_scheduler_ticks_on_interval() {
        let remote = FakeRemote::new();
        let (executor, _temp) = test_executor(remote.clone(), EngineConfig::default()).await;
        let scheduler = SyncScheduler::new(executor.clone(), Duration::from_millis(50));
        let mut rx = executor.state().subscribe();

        scheduler.start();
        rx.wait_for(|s| s.last_sync_at.is_some()).await.unwrap();

        // Enqueued after the immediate pass; only a later tick can send it
        executor
            .log()
            .enqueue(&NewAction::create("leads", json!({})))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while remote.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(remote.calls(), vec!["CREATE leads"]);
        scheduler.stop().unwrap().await.unwrap();
    }
}
