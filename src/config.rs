use crate::api::DEFAULT_BASE_URL;
use crate::sync::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Daemon configuration, read from a JSON file. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_pull_interval_secs")]
    pub pull_interval_secs: u64,
    #[serde(default = "default_offline_after_failures")]
    pub offline_after_failures: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Browser cookie jar holding the session ticket
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Identifies this install in the client name sent with every request
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Browser origins (the extension's own pages) allowed to use the daemon
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Workspace the terminal tab creates tasks in when none is given
    #[serde(default)]
    pub default_workspace_id: Option<String>,
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_pull_interval_secs() -> u64 {
    60
}

fn default_offline_after_failures() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./asanatabs.redb")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7733))
}

fn default_channel_buffer() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            pull_interval_secs: default_pull_interval_secs(),
            offline_after_failures: default_offline_after_failures(),
            request_timeout_secs: default_request_timeout_secs(),
            database_path: default_database_path(),
            listen_addr: default_listen_addr(),
            cookie_file: None,
            channel_buffer: default_channel_buffer(),
            instance_id: None,
            allowed_origins: Vec::new(),
            default_workspace_id: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pull_interval: Duration::from_secs(self.pull_interval_secs.max(1)),
            offline_after_failures: self.offline_after_failures,
            channel_buffer: self.channel_buffer,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured instance id, or a fresh random one.
    pub fn instance_id(&self) -> String {
        self.instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}
