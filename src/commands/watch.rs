use clap::Args;
use offsync_core::{HttpProbe, SyncState};

use super::{open_engine, Connectivity};
use crate::config::Config;

/// Keep syncing in the background until interrupted (Ctrl-C)
#[derive(Args)]
pub struct WatchCommand {}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = open_engine(config, Connectivity::Background).await?;
        engine.spawn_probe(HttpProbe::new(&config.server_url.value));

        println!(
            "Watching {} every {}s. Press Ctrl-C to stop.",
            config.server_url.value, config.sync_interval.value
        );

        let mut rx = engine.subscribe();
        let mut last = rx.borrow_and_update().clone();
        print_state(&last);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = rx.borrow_and_update().clone();
                    if state.online != last.online
                        || state.last_sync_at != last.last_sync_at
                        || state.pending_count != last.pending_count
                    {
                        print_state(&state);
                    }
                    last = state;
                }
            }
        }

        println!("Stopping...");
        engine.shutdown().await;
        Ok(())
    }
}

fn print_state(state: &SyncState) {
    let now = chrono::Local::now().format("%H:%M:%S");
    println!(
        "[{}] {} | pending {} | failed {}",
        now,
        if state.online { "online " } else { "offline" },
        state.pending_count,
        state.failed_count
    );
    for error in &state.last_errors {
        println!("           ✗ {}", error);
    }
}
