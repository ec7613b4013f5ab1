//! Sync CLI command: one pass against the server.

use clap::Args;
use offsync_core::{SyncError, SyncReport};

use super::{open_engine, Connectivity};
use crate::config::Config;

/// Send queued mutations to the server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Pull tracked collections into the local mirror before sending
    #[arg(long)]
    full: bool,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Probe).await?;

        if !engine.get_sync_state().online {
            let pending = engine.get_sync_state().pending_count;
            engine.shutdown().await;
            println!("Server unreachable: {}", config.server_url.value);
            println!("{} action(s) remain queued.", pending);
            return Err(Box::new(SyncError::Offline));
        }

        println!("Syncing with {}...", config.server_url.value);
        println!();

        let result = if self.full {
            engine.run_full_sync().await
        } else {
            engine.run_sync_pass().await
        };
        let pending = engine.get_sync_state().pending_count;
        engine.shutdown().await;

        print_report(&result?, pending);
        Ok(())
    }
}

fn print_report(report: &SyncReport, pending: u64) {
    if report.skipped {
        println!("Another sync is already running.");
        return;
    }

    for pulled in &report.pulled {
        println!("  ✓ pulled {} ({} entities)", pulled.entity_type, pulled.count);
    }
    if report.succeeded > 0 {
        println!("  ✓ sent {} action(s)", report.succeeded);
    }
    for error in &report.errors {
        println!("  ✗ {}", error);
    }

    println!();
    if report.errors.is_empty() {
        println!("Sync complete. {} action(s) pending.", pending);
    } else {
        println!(
            "Sync finished with {} error(s); {} dropped, {} action(s) pending.",
            report.errors.len(),
            report.dropped,
            pending
        );
    }
}
