use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiConfig, RetryPolicy};
use crate::application::PopupGeometry;

const APP_DIR: &str = "dupe-guard";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no {0} directory is known for this platform")]
    NoDirectory(&'static str),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Where the duplicate-detection service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: ApiConfig::default().base_url,
        }
    }
}

/// Retry budget for every backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupConfig {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl Default for PopupConfig {
    fn default() -> Self {
        let geometry = PopupGeometry::default();
        Self {
            width: geometry.width,
            height: geometry.height,
            left: geometry.left,
            top: geometry.top,
        }
    }
}

/// Global configuration loaded from `<config dir>/dupe-guard/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub popup: PopupConfig,
    /// Where downloads are saved; the platform download directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    /// Key-value store shared with popups; under the local data directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Config {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.backend.base_url.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            timeout: Duration::from_millis(self.retry.timeout_ms),
        }
    }

    pub fn popup_geometry(&self) -> PopupGeometry {
        PopupGeometry {
            width: self.popup.width,
            height: self.popup.height,
            left: self.popup.left,
            top: self.popup.top,
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("storage.json")),
        }
    }
}

/// Per-user directory for the store and the log file.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or(ConfigError::NoDirectory("local data"))
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join("config.toml"))
        .ok_or(ConfigError::NoDirectory("config"))
}

/// Load configuration from `path`, writing a default file there if none exists.
pub fn load_or_init(path: &Path) -> Result<Config, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        let default_cfg = Config::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, toml).map_err(io_err)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).map_err(io_err)?;
    toml::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
