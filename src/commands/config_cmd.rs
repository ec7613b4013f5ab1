use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# offsync configuration

# Path to SQLite database (default: platform data dir, e.g. ~/.local/share/offsync/offsync.db)
# Relative paths resolve against this file's directory.
# database_path: offsync.db

# REST service that receives queued mutations
server_url: http://localhost:8080

# Bearer token sent with every request
# api_key: your-secret-key-here

# Seconds between background passes in `offsync watch`
sync_interval: 30

# Collections pulled into the local mirror by `offsync sync --full`
entity_types: []
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_config(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);
                init_config(&config_path)
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("database_path: {}", config.database_path.value.display());
    println!("  source: {}", config.database_path.source);
    println!();

    println!("server_url: {}", config.server_url.value);
    println!("  source: {}", config.server_url.source);
    println!();

    match &config.api_key {
        Some(key) => {
            println!("api_key: ********");
            println!("  source: {}", key.source);
        }
        None => println!("api_key: (not set)"),
    }
    println!();

    println!("sync_interval: {}s", config.sync_interval.value);
    println!("  source: {}", config.sync_interval.source);
    println!();

    if config.entity_types.is_empty() {
        println!("entity_types: (none)");
    } else {
        println!("entity_types: {}", config.entity_types.join(", "));
    }
}

fn init_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        println!("Config file already exists: {}", config_path.display());
        println!("Use 'offsync config show' to view current configuration.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(config_path)?;
    file.write_all(DEFAULT_CONFIG.as_bytes())?;

    println!("Created config file: {}", config_path.display());
    println!("\nEdit this file to customize your settings.");
    Ok(())
}
