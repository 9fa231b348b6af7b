use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "HEALTHGUARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub history: HistoryConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig { path: PathBuf::from("patients.db") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig { host: "127.0.0.1".to_string(), port: 5000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Rows shown on the dashboard and in the list exports.
    pub recent_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig { recent_limit: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_secs: u64,
    pub pbkdf2_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig { session_ttl_secs: 8 * 60 * 60, pbkdf2_iterations: 600_000 }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(ConfigError::Invalid("api.port must be non-zero".to_string()));
        }
        if self.history.recent_limit == 0 {
            return Err(ConfigError::Invalid("history.recent_limit must be at least 1".to_string()));
        }
        if self.auth.pbkdf2_iterations == 0 {
            return Err(ConfigError::Invalid("auth.pbkdf2_iterations must be at least 1".to_string()));
        }
        if self.auth.session_ttl_secs == 0 || self.auth.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
            )));
        }
        Ok(())
    }
}

/// Load and validate the YAML config at `path`. A missing file yields the
/// defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(raw) => parse_config(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path: path.to_path_buf(), source },
            other => other,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            let config = Config::default();
            config.validate()?;
            config
        }
        Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
    };
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(raw)
        .map_err(|source| ConfigError::Parse { path: PathBuf::new(), source })?;
    config.validate()?;
    Ok(config)
}

/// Config path from the environment, or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
