use clap::Args;

use super::{open_engine, Connectivity};
use crate::config::Config;

/// Print a mirrored collection as JSON (works offline)
#[derive(Args)]
pub struct CollectionCommand {
    /// Collection name (e.g. leads)
    entity_type: String,
}

impl CollectionCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Offline).await?;
        let result = engine.get_collection(&self.entity_type).await;
        engine.shutdown().await;

        println!("{}", serde_json::to_string_pretty(&result?)?);
        Ok(())
    }
}
