//! FOTA Configuration Module
//! Loads fota.config.json and overlays environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::upload::UploadLimits;

pub const CONFIG_FILE: &str = "fota.config.json";

pub const ENV_USERNAME: &str = "US_AUTH_USERNAME";
pub const ENV_PASSWORD: &str = "US_AUTH_PASSWORD";
pub const ENV_PORT: &str = "US_SERVER_PORT";
pub const ENV_HOST: &str = "US_HOST";
pub const ENV_DATA_DIR: &str = "US_DATA_DIR";
pub const ENV_UPLOAD_TIMEOUT: &str = "US_UPLOAD_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> u64 {
    16 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            upload_timeout_secs: default_upload_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load `<data_dir>/fota.config.json` if present, otherwise defaults.
    pub fn load_or_default(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(ENV_USERNAME) {
            self.auth.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.auth.password = password;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(data_dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(secs) = lookup(ENV_UPLOAD_TIMEOUT) {
            self.upload_timeout_secs =
                secs.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_UPLOAD_TIMEOUT,
                    value: secs.clone(),
                })?;
        }
        Ok(())
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_bytes: self.max_upload_bytes,
            timeout: Duration::from_secs(self.upload_timeout_secs),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.upload_timeout_secs, 30);
        assert!(config.auth.username.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "secret"),
            (ENV_PORT, "4443"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.auth.username, "admin");
        assert_eq!(config.auth.password, "secret");
        assert_eq!(config.port, 4443);
        assert_eq!(config.bind_addr(), "0.0.0.0:4443");
    }

    #[test]
    fn test_invalid_port() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == ENV_PORT).then(|| "https".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_PORT, .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.upload_timeout_secs = 5;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.upload_timeout_secs, 5);
        assert_eq!(loaded.data_dir, dir.path());
        assert_eq!(loaded.upload_limits().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("nope.json")),
            Err(ConfigError::NotFound(_))
        ));
        let config = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(config.port, 8443);
    }
}
