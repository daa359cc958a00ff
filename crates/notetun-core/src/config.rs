//! Configuration and persisted state.
//!
//! Unlike the usual TOML-based config layer, the persisted files here are
//! fixed at JSON by the wire contract this crate implements, so this module
//! reads/writes `serde_json` rather than `toml`. The resolution story is
//! simpler too: file → defaults, with no environment-variable override
//! layer (the source this is modeled on is file-only).
//!
//! Config file location:
//!   1. $NOTETUN_DATA_DIR/config.json (explicit override of the data dir)
//!   2. ./data/config.json

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `{mode, storage:{...}, settings:{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotetunConfig {
    pub mode: String,
    pub storage: StorageConfig,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub cookies_path: PathBuf,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Recognized settings (exhaustive, per the persisted-state contract).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub proxy_mode: String,
    pub proxy_port: u16,
    pub socks5_port: u16,
    pub timeout: u64,
    pub chunk_size: usize,
    pub chunk_idle_timeout: f64,
    pub poll_interval: f64,
    pub cleanup_chunks: bool,
    pub tunnel_idle_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_mode: "http".to_string(),
            proxy_port: 8080,
            socks5_port: 1080,
            timeout: 120,
            chunk_size: 500_000,
            chunk_idle_timeout: 0.1,
            poll_interval: 0.1,
            cleanup_chunks: true,
            tunnel_idle_timeout: 120,
        }
    }
}

/// `{client_pool:[note_id,...], server_pool:[note_id,...]}`. Immutable
/// after setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePoolFile {
    pub client_pool: Vec<String>,
    pub server_pool: Vec<String>,
}

impl NotetunConfig {
    /// Load `config.json` from the resolved data directory. Returns `Ok(None)`
    /// (not an error) if the file is absent — callers decide whether a
    /// missing config is fatal.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = serde_json::from_str(&text).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl NotePoolFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Resolved data directory: `$NOTETUN_DATA_DIR` if set, else `./data`.
pub fn data_dir() -> PathBuf {
    std::env::var("NOTETUN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

pub fn note_pool_path() -> PathBuf {
    data_dir().join("yanotes_pool.json")
}

pub fn cookie_jar_path() -> PathBuf {
    data_dir().join("diskcookies.txt")
}
