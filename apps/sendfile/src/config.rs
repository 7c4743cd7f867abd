//! Configuration management.
//!
//! Read from the file given with `--config`, else from
//! `~/.config/sendfile/sendfile.toml` when it exists. Command-line flags
//! take precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sendfile_protocol::constants::MAX_FILE_SIZE;
use sendfile_server::ServerConfig;

use crate::cli::Cli;

/// Process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen/connect address (`tcp:<host>:<port>` or `unix:<path>`).
    #[serde(default)]
    pub address: Option<String>,

    /// Directory blobs are stored under.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Largest accepted transfer in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Idle timeout of control connections in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(".cache").join("sendfile")
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_idle_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            cache_dir: default_cache_dir(),
            max_file_size: default_max_file_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies command-line flags on top of file values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(address) = &cli.address {
            self.address = Some(address.clone());
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(max) = cli.max_file_size {
            self.max_file_size = max;
        }
        self
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_file_size: self.max_file_size,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

fn config_path() -> PathBuf {
    home_dir()
        .join(".config")
        .join("sendfile")
        .join("sendfile.toml")
}

/// Returns the user's home directory.
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
