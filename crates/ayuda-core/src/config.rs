//! Configuration management for ayuda.
//!
//! Loads configuration from ${AYUDA_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for ayuda configuration and data files.
    //!
    //! AYUDA_HOME resolution order:
    //! 1. AYUDA_HOME environment variable (if set)
    //! 2. ~/.config/ayuda (default)
    //! 3. ./.ayuda when no home directory can be determined

    use std::path::PathBuf;

    pub fn ayuda_home() -> PathBuf {
        if let Ok(home) = std::env::var("AYUDA_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".ayuda"),
            |h| h.join(".config").join("ayuda"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        ayuda_home().join("config.toml")
    }

    /// Default location of the persisted offline action queue.
    pub fn offline_queue_path() -> PathBuf {
        ayuda_home().join("offline_queue.json")
    }

    /// Expands a leading `~/` to the home directory when one is known.
    pub fn expand_home(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the dashboard backend (the `/whatsapp/...` routes live under it).
    pub base_url: String,
    /// Bearer token for the session. `AYUDA_TOKEN` is used when unset.
    pub token: Option<String>,
    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_BASE_URL.to_string(),
            token: None,
            request_timeout_secs: 0,
        }
    }
}

impl ApiConfig {
    /// Base URL resolution order:
    /// 1. `AYUDA_API_URL` env var (if set and non-empty)
    /// 2. `api.base_url` from config
    pub fn effective_base_url(&self) -> String {
        non_empty_env("AYUDA_API_URL").unwrap_or_else(|| self.base_url.trim().to_string())
    }

    /// Token resolution order:
    /// 1. `api.token` from config (if non-empty)
    /// 2. `AYUDA_TOKEN` env var
    pub fn effective_token(&self) -> Option<String> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| non_empty_env("AYUDA_TOKEN"))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Polling and cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub message_page_size: u32,
    pub message_cache_capacity: usize,
    /// Overrides ${AYUDA_HOME}/offline_queue.json
    pub offline_queue_file: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Config::DEFAULT_POLL_INTERVAL_MS,
            message_page_size: Config::DEFAULT_MESSAGE_PAGE_SIZE,
            message_cache_capacity: Config::DEFAULT_MESSAGE_CACHE_CAPACITY,
            offline_queue_file: None,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn offline_queue_path(&self) -> PathBuf {
        self.offline_queue_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map_or_else(paths::offline_queue_path, paths::expand_home)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
}

impl Config {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
    pub const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 200;
    pub const DEFAULT_MESSAGE_CACHE_CAPACITY: usize = 50;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
