//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod ingest;
mod server;
mod storage;

pub use ingest::IngestConfig;
pub use server::ServerConfig;
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SURVEY_INGEST_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SURVEY_INGEST";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SURVEY_INGEST_LOG";
/// Environment variable selecting the log output format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "SURVEY_INGEST_LOG_FORMAT";

use serde::Deserialize;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Ingestion pipeline configuration.
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                // Values stay strings until deserialized into their field's
                // type, so string settings such as secrets keep leading zeros.
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(false),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ingest.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.ingest.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "ingest.max_body_bytes must be positive".to_string(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_connections must be positive".to_string(),
            ));
        }
        if matches!(&self.ingest.signing_secret, Some(secret) if secret.is_empty()) {
            return Err(ConfigError::Invalid(
                "ingest.signing_secret must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.sqlite.path = crate::storage::SQLITE_MEMORY_PATH.to_string();
        config.storage.max_connections = 1;
        config
    }
}
