use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

use offsync_core::EngineConfig;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Base URL of the REST service
    pub server_url: ConfigValue<String>,
    /// Bearer token sent with every request
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Option<ConfigValue<String>>,
    /// Seconds between background passes (`watch` only)
    pub sync_interval: ConfigValue<u64>,
    /// Collections pulled by `sync --full`
    pub entity_types: Vec<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    server_url: Option<String>,
    api_key: Option<String>,
    sync_interval: Option<u64>,
    entity_types: Vec<String>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading overrides through `env`.
    fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Start with defaults
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("offsync.db"),
            ConfigSource::Default,
        );
        let mut server_url = ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut api_key = None;
        let mut sync_interval = ConfigValue::new(DEFAULT_SYNC_INTERVAL_SECS, ConfigSource::Default);
        let mut entity_types = Vec::new();
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(key) = file_config.api_key {
                api_key = Some(ConfigValue::new(key, ConfigSource::File));
            }
            if let Some(secs) = file_config.sync_interval {
                sync_interval = ConfigValue::new(secs, ConfigSource::File);
            }
            entity_types = file_config.entity_types;
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("OFFSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(url) = env("OFFSYNC_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(key) = env("OFFSYNC_API_KEY") {
            api_key = Some(ConfigValue::new(key, ConfigSource::Environment));
        }
        if let Some(secs) = env("OFFSYNC_SYNC_INTERVAL") {
            let secs = secs
                .parse()
                .map_err(|_| ConfigError::InvalidValue("OFFSYNC_SYNC_INTERVAL", secs))?;
            sync_interval = ConfigValue::new(secs, ConfigSource::Environment);
        }

        if sync_interval.value == 0 {
            return Err(ConfigError::InvalidValue("sync_interval", "0".to_string()));
        }

        Ok(Self {
            database_path,
            server_url,
            api_key,
            sync_interval,
            entity_types,
            config_file,
        })
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sync_interval: Duration::from_secs(self.sync_interval.value),
            ..EngineConfig::new(self.database_path.value.clone())
        }
        .with_entity_types(self.entity_types.iter().cloned())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| k.value.clone())
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/offsync/
    /// - macOS: ~/Library/Application Support/offsync/
    /// - Windows: %APPDATA%/offsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/offsync/
    /// - macOS: ~/Library/Application Support/offsync/
    /// - Windows: %APPDATA%/offsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Never print the key itself, only where it came from.
fn serialize_secret<S: Serializer>(
    value: &Option<ConfigValue<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value
        .as_ref()
        .map(|v| ConfigValue::new("********", v.source.clone()))
        .serialize(serializer)
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
