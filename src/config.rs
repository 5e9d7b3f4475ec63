//! Configuration management with validation and defaults
//!
//! Values come from an optional TOML file, then `POOLGAME_*` environment
//! overrides, then validation.

use crate::errors::ConfigurationError;
use crate::games::settlement::RiskPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub games: GamesConfig,
    pub broadcast: BroadcastConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub node_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            node_id: "poolgame-1".to_string(),
        }
    }
}

/// Ledger backend selection
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process ledger, lost on restart
    Memory,
    /// RocksDB ledger under `data_directory`
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(ConfigurationError::InvalidValue {
                field: "storage.backend".to_string(),
                value: other.to_string(),
                reason: "expected 'memory' or 'rocksdb'".to_string(),
            }),
        }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/poolgame_data".to_string(),
            clear_on_start: false,
        }
    }
}

/// Game engine policies
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    /// End and settle a game as soon as an admission fills its cap
    pub auto_end_on_cap: bool,
    pub risk_policy: RiskPolicy,
    /// Queued commands per variant worker before callers wait for room
    pub command_buffer: usize,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            auto_end_on_cap: false,
            risk_policy: RiskPolicy::AlwaysPay,
            command_buffer: 1024,
        }
    }
}

/// Event fan-out configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub channel_capacity: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Log filter used when `RUST_LOG` is unset
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "poolgame=info,tower_http=info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<PoolConfig, ConfigurationError> {
        let mut config = match &self.config_path {
            Some(path) => self.load_from_file(path)?,
            None => PoolConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<PoolConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut PoolConfig) -> Result<(), ConfigurationError> {
        if let Ok(host) = env::var("POOLGAME_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("POOLGAME_PORT") {
            config.server.port = parse_env("POOLGAME_PORT", port, "Invalid port number")?;
        }
        if let Ok(backend) = env::var("POOLGAME_STORAGE") {
            config.storage.backend = backend.parse()?;
        }
        if let Ok(data_dir) = env::var("POOLGAME_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(auto_end) = env::var("POOLGAME_AUTO_END_ON_CAP") {
            config.games.auto_end_on_cap =
                parse_env("POOLGAME_AUTO_END_ON_CAP", auto_end, "Invalid boolean value")?;
        }
        if let Ok(filter) = env::var("POOLGAME_LOG") {
            config.logging.filter = filter;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &PoolConfig) -> Result<(), ConfigurationError> {
        if config.server.port == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.port".to_string(),
                value: "0".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if config.server.request_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be at least one second".to_string(),
            });
        }

        if config.storage.backend == StorageBackend::RocksDb && config.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }

        if config.games.command_buffer == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "games.command_buffer".to_string(),
                value: "0".to_string(),
                reason: "Command buffer cannot be zero".to_string(),
            });
        }

        if config.broadcast.channel_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "broadcast.channel_capacity".to_string(),
                value: "0".to_string(),
                reason: "Channel capacity cannot be zero".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &PoolConfig, path: &str) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)))
    }
}

fn parse_env<T: FromStr>(field: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> Result<(), ConfigurationError> {
    ConfigLoader::new().save(&PoolConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::RocksDb);
        assert!(!config.games.auto_end_on_cap);
        assert_eq!(config.games.risk_policy, RiskPolicy::AlwaysPay);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = PoolConfig::default();

        assert!(loader.validate(&config).is_ok());

        config.server.port = 0;
        assert!(loader.validate(&config).is_err());

        config.server.port = 8080;
        config.games.command_buffer = 0;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PoolConfig = toml::from_str(
            r#"
            [games]
            auto_end_on_cap = true
            risk_policy = "forfeit_unless_full"

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert!(config.games.auto_end_on_cap);
        assert_eq!(config.games.risk_policy, RiskPolicy::ForfeitUnlessFull);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.games.command_buffer, 1024);
    }

    #[test]
    fn test_save_and_load_config() -> Result<(), ConfigurationError> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = PoolConfig::default();
        original.server.port = 9191;
        original.games.auto_end_on_cap = true;

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = loader.load_from_file(path)?;

        assert_eq!(loaded.server.port, 9191);
        assert!(loaded.games.auto_end_on_cap);
        Ok(())
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("RocksDB".parse::<StorageBackend>().unwrap(), StorageBackend::RocksDb);
        assert!("postgres".parse::<StorageBackend>().is_err());
    }
}
