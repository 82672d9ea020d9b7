use crate::logger::LogLevel;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_NAMESPACE: &str = "dynbit";
pub const ENV_PREFIX: &str = "DYNBIT";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// Prefix of every key written by the mapper.
    pub namespace: String,
    /// Database file; `None` keeps everything in memory.
    pub db_path: Option<String>,
    pub db_cache_size_mb: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            db_path: None,
            db_cache_size_mb: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
}

impl AppConfig {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder =
            Config::builder()
                .add_source(File::with_name(path).required(true))
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).separator("__"));
        builder.build()?.try_deserialize()
    }

    /// Defaults overridden by `DYNBIT__*` environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).separator("__"))
            .build()?
            .try_deserialize()
    }
}
