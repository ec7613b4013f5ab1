use clap::Args;

use super::{open_engine, Connectivity};
use crate::config::Config;

/// Delete every mirrored collection; queued mutations are kept
#[derive(Args)]
pub struct ClearCommand {}

impl ClearCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Offline).await?;
        let result = engine.clear_offline_data().await;
        let pending = engine.get_sync_state().pending_count;
        engine.shutdown().await;
        result?;

        println!("Cleared offline data. {} queued action(s) kept.", pending);
        Ok(())
    }
}
