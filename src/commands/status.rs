use clap::Args;

use super::{open_engine, Connectivity, OutputFormat};
use crate::config::Config;

/// Show the persisted sync state and server reachability
#[derive(Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Probe).await?;
        let state = engine.get_sync_state();
        engine.shutdown().await;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            OutputFormat::Text => {
                println!("Sync Status");
                println!("===========");
                println!();
                println!("Server:    {}", config.server_url.value);
                println!(
                    "Network:   {}",
                    if state.online { "✓ online" } else { "✗ offline" }
                );
                println!(
                    "Last sync: {}",
                    state
                        .last_sync_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
                println!("Pending:   {}", state.pending_count);
                println!("Failed:    {}", state.failed_count);

                if !state.last_errors.is_empty() {
                    println!();
                    println!("Errors from the last pass:");
                    for error in &state.last_errors {
                        println!("  - {}", error);
                    }
                }
            }
        }

        Ok(())
    }
}
