use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    ClearCommand, CollectionCommand, ConfigCommand, EnqueueCommand, QueueCommand, StatusCommand,
    SyncCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "offsync")]
#[command(version)]
#[command(about = "Queue mutations offline and sync them with a REST service", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a create, update or delete
    Enqueue(EnqueueCommand),

    /// Send queued mutations now
    Sync(SyncCommand),

    /// Show sync status
    Status(StatusCommand),

    /// List queued mutations
    Queue(QueueCommand),

    /// Print a mirrored collection
    Collection(CollectionCommand),

    /// Clear mirrored collections
    Clear(ClearCommand),

    /// Sync in the background until interrupted
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offsync=info,offsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Enqueue(cmd)) => cmd.run(&config).await?,
        Some(Commands::Sync(cmd)) => cmd.run(&config).await?,
        Some(Commands::Status(cmd)) => cmd.run(&config).await?,
        Some(Commands::Queue(cmd)) => cmd.run(&config).await?,
        Some(Commands::Collection(cmd)) => cmd.run(&config).await?,
        Some(Commands::Clear(cmd)) => cmd.run(&config).await?,
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
