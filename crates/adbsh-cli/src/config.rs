//! Client configuration at `~/.adbsh/config.toml`.
//!
//! Provides the default device target, key directory, and connect timeout.
//! CLI flags always override config file values.

use std::path::{Path, PathBuf};

use adbsh_client::session::{ConnectOptions, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PORT};
use adbsh_client::KeyStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Device host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Device port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `public.key` / `private.key` (empty = `~/.adbsh`).
    #[serde(default)]
    pub key_dir: String,

    /// Socket connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            key_dir: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Resolve the key directory: `--dir` flag, then config, then `~/.adbsh`.
    pub fn key_dir(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = flag {
            return Ok(dir.to_path_buf());
        }
        if !self.default.key_dir.is_empty() {
            return expand_home(&self.default.key_dir);
        }
        Ok(KeyStore::default_location()?.dir().to_path_buf())
    }

    /// Device target for network commands; `host` / `port` flags win over
    /// the config file.
    pub fn connect_options(&self, host: Option<&str>, port: Option<u16>) -> ConnectOptions {
        ConnectOptions {
            host: host.unwrap_or(&self.default.host).to_string(),
            port: port.unwrap_or(self.default.port),
            connect_timeout_ms: self.default.connect_timeout_ms,
            ..Default::default()
        }
    }
}

/// Default config path: `config.toml` next to the default key directory.
pub fn default_path() -> Result<PathBuf> {
    Ok(KeyStore::default_location()?.dir().join("config.toml"))
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("cannot determine home directory")
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home_dir()?.join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}
