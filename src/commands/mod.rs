mod clear;
mod collection;
mod config_cmd;
mod enqueue;
mod queue;
mod status;
mod sync_cmd;
mod watch;

pub use clear::ClearCommand;
pub use collection::CollectionCommand;
pub use config_cmd::ConfigCommand;
pub use enqueue::EnqueueCommand;
pub use queue::QueueCommand;
pub use status::StatusCommand;
pub use sync_cmd::SyncCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use offsync_core::{
    ConnectivityProbe, EngineConfig, HttpProbe, HttpRemote, NetworkMonitor, SyncEngine, SyncError,
};
use std::sync::Arc;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// How a command needs connectivity resolved before the engine starts.
#[derive(Clone, Copy, PartialEq)]
pub enum Connectivity {
    /// Never touch the network.
    Offline,
    /// Probe the server once; passes run only when requested.
    Probe,
    /// Probe the server and keep the background scheduler running.
    Background,
}

/// Opens the engine against the configured database and server.
pub async fn open_engine(
    config: &Config,
    connectivity: Connectivity,
) -> Result<SyncEngine<HttpRemote>, SyncError> {
    let online = match connectivity {
        Connectivity::Offline => false,
        Connectivity::Probe | Connectivity::Background => {
            HttpProbe::new(&config.server_url.value).probe().await
        }
    };
    tracing::debug!(online, server = %config.server_url.value, "connectivity resolved");

    let engine_config = EngineConfig {
        background_sync: connectivity == Connectivity::Background,
        ..config.engine_config()
    };

    SyncEngine::initialize(
        engine_config,
        Arc::new(HttpRemote::new(config.server_url.value.clone())),
        NetworkMonitor::new(online),
        config.api_key(),
    )
    .await
}
