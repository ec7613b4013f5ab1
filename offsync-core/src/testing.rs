//! In-process fakes shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::db::init_db;
use crate::error::RemoteError;
use crate::executor::SyncExecutor;
use crate::remote::RemoteService;
use crate::state::{SyncState, SyncStateHandle};

/// Remote double that records every call and fails on request.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<String>>,
    failing_types: Mutex<HashSet<String>>,
    collections: Mutex<HashMap<String, Vec<Value>>>,
    pull_since: Mutex<Vec<(String, Option<DateTime<Utc>>)>>,
    delay: Mutex<Option<Duration>>,
    mutation_count: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_type(&self, entity_type: &str) {
        self.failing_types
            .lock()
            .unwrap()
            .insert(entity_type.to_string());
    }

    pub fn heal_type(&self, entity_type: &str) {
        self.failing_types.lock().unwrap().remove(entity_type);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_collection(&self, entity_type: &str, entities: Vec<Value>) {
        self.collections
            .lock()
            .unwrap()
            .insert(entity_type.to_string(), entities);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutation_count.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.pull_since.lock().unwrap().clone()
    }

    async fn respond(&self, call: String, entity_type: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_types.lock().unwrap().contains(entity_type) {
            return Err(RemoteError::status(500, format!("{} unavailable", entity_type)));
        }
        Ok(())
    }
}

impl RemoteService for FakeRemote {
    async fn create(&self, entity_type: &str, _payload: &Value) -> Result<(), RemoteError> {
        self.mutation_count.fetch_add(1, Ordering::SeqCst);
        self.respond(format!("CREATE {}", entity_type), entity_type)
            .await
    }

    async fn update(&self, entity_type: &str, id: &str, _payload: &Value) -> Result<(), RemoteError> {
        self.mutation_count.fetch_add(1, Ordering::SeqCst);
        self.respond(format!("UPDATE {}/{}", entity_type, id), entity_type)
            .await
    }

    async fn delete(&self, entity_type: &str, id: &str) -> Result<(), RemoteError> {
        self.mutation_count.fetch_add(1, Ordering::SeqCst);
        self.respond(format!("DELETE {}/{}", entity_type, id), entity_type)
            .await
    }

    async fn fetch_since(
        &self,
        entity_type: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, RemoteError> {
        self.pull_since
            .lock()
            .unwrap()
            .push((entity_type.to_string(), since));
        self.respond(format!("GET {}", entity_type), entity_type)
            .await?;
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(entity_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// Builds an executor over a fresh database, starting online.
pub async fn test_executor(
    remote: Arc<FakeRemote>,
    config: EngineConfig,
) -> (Arc<SyncExecutor<FakeRemote>>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
    let state = Arc::new(SyncStateHandle::new(SyncState {
        online: true,
        ..Default::default()
    }));
    let executor = SyncExecutor::new(remote, pool, state, &config);
    (Arc::new(executor), temp_dir)
}
