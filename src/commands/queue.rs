use clap::Args;

use super::{open_engine, Connectivity, OutputFormat};
use crate::config::Config;

/// List queued mutations in the order they will be sent
#[derive(Args)]
pub struct QueueCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl QueueCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Offline).await?;
        let result = engine.pending_actions().await;
        engine.shutdown().await;
        let actions = result?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&actions)?);
            }
            OutputFormat::Text => {
                if actions.is_empty() {
                    println!("No pending actions.");
                    return Ok(());
                }

                println!(
                    "{:<26} {:<8} {:<6} {:<16} {:<12} {:<8} QUEUED",
                    "ID", "PRIORITY", "KIND", "TYPE", "ENTITY", "ATTEMPTS"
                );
                for action in &actions {
                    println!(
                        "{:<26} {:<8} {:<6} {:<16} {:<12} {:<8} {}",
                        action.id,
                        action.priority.to_string(),
                        action.kind.to_string(),
                        action.entity_type,
                        action.entity_id.as_deref().unwrap_or("-"),
                        format!("{}/{}", action.attempt, action.attempt_limit),
                        action.enqueued_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                println!();
                println!("{} action(s) pending.", actions.len());
            }
        }

        Ok(())
    }
}
