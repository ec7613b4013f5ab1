use std::path::PathBuf;
use std::time::Duration;

use crate::action::DEFAULT_ATTEMPT_LIMIT;

/// Runtime settings for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite file holding the action log, mirror and state snapshot.
    pub database_path: PathBuf,
    /// Period of the background drain pass while online.
    pub sync_interval: Duration,
    /// Upper bound for each remote call.
    pub call_timeout: Duration,
    /// How often the reachability probe runs.
    pub probe_interval: Duration,
    /// Attempts before a queued action is dropped.
    pub attempt_limit: u32,
    /// Cap on `last_errors` entries kept in the sync state.
    pub max_reported_errors: usize,
    /// Collections pulled by a full sync.
    pub entity_types: Vec<String>,
    /// Run the periodic scheduler while online. When false, passes only run
    /// when requested.
    pub background_sync: bool,
}

impl EngineConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = types.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("offsync.db"),
            sync_interval: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            probe_interval: Duration::from_secs(15),
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
            max_reported_errors: 50,
            entity_types: Vec::new(),
            background_sync: true,
        }
    }
}
