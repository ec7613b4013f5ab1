use clap::Args;
use offsync_core::{ActionKind, Priority};

use super::{open_engine, Connectivity};
use crate::config::Config;

/// Queue a mutation for delivery on the next sync
#[derive(Args)]
pub struct EnqueueCommand {
    /// Mutation kind: create, update, delete
    kind: String,

    /// Collection the mutation targets (e.g. leads)
    entity_type: String,

    /// Target entity id (required for update and delete)
    #[arg(long)]
    id: Option<String>,

    /// JSON body sent with create and update
    #[arg(long, default_value = "{}")]
    payload: String,

    /// Priority: high, medium, low
    #[arg(long, short, default_value = "medium")]
    priority: String,
}

impl EnqueueCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let kind: ActionKind = self.kind.parse().map_err(|e: String| e)?;
        let priority: Priority = self.priority.parse().map_err(|e: String| e)?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| format!("Invalid --payload JSON: {}", e))?;

        let engine = open_engine(config, Connectivity::Offline).await?;
        let result = engine
            .enqueue_mutation(
                kind,
                &self.entity_type,
                self.id.as_deref(),
                payload,
                Some(priority),
            )
            .await;
        let pending = engine.get_sync_state().pending_count;
        engine.shutdown().await;

        let id = result?;
        println!("Queued {} {} ({})", self.entity_type, kind, id);
        println!("{} action(s) pending. Run 'offsync sync' to send them.", pending);
        Ok(())
    }
}
