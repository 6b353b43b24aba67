//! Command-line arguments for the binaries.

use crate::api::Session;
use crate::config::{Config, ConfigError};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Background sync daemon for the task dashboard.
#[derive(Parser, Debug)]
#[command(name = "asanatabs-daemon", about, version)]
pub struct DaemonArgs {
    /// JSON config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to serve tab channels on
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Path to the redb cache file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Cookie jar holding the session ticket
    #[arg(long)]
    pub cookie_file: Option<PathBuf>,

    /// Session ticket value; takes precedence over the cookie file
    #[arg(long, env = "ASANATABS_SESSION", hide_env_values = true)]
    pub session: Option<String>,

    /// Seconds between background pulls
    #[arg(long)]
    pub pull_interval: Option<u64>,

    /// Browser origin allowed to connect; repeat for several
    #[arg(long = "allow-origin")]
    pub allow_origins: Vec<String>,
}

impl DaemonArgs {
    /// Override config values with the flags that were given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(ref database) = self.database {
            config.database_path = database.clone();
        }
        if let Some(ref cookie_file) = self.cookie_file {
            config.cookie_file = Some(cookie_file.clone());
        }
        if let Some(secs) = self.pull_interval {
            config.pull_interval_secs = secs;
        }
        config.allowed_origins.extend(self.allow_origins.iter().cloned());
    }

    pub fn session(&self, config: &Config) -> Session {
        match (&self.session, &config.cookie_file) {
            (Some(ticket), _) => Session::Ticket(ticket.clone()),
            (None, Some(path)) => Session::CookieFile(path.clone()),
            (None, None) => Session::None,
        }
    }
}

/// Terminal tab: view and edit tasks through a running daemon.
#[derive(Parser, Debug)]
#[command(name = "asanatabs-tab", about, version)]
pub struct TabArgs {
    /// Daemon WebSocket base URL
    #[arg(long, env = "ASANATABS_SERVER", default_value = "ws://127.0.0.1:7733")]
    pub server: String,

    /// JSON config file; only `default_workspace_id` is read
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: TabCommand,
}

impl TabArgs {
    pub fn channel_url(&self) -> String {
        format!(
            "{}/channels/{}",
            self.server.trim_end_matches('/'),
            crate::channel::CHANNEL_NAME
        )
    }

    pub fn load_config(&self) -> Result<Config, ConfigError> {
        match &self.config {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }
}

/// The workspace for a new task: the flag if given, else the configured default.
pub fn create_workspace(flag: Option<String>, config: &Config) -> Option<String> {
    flag.or_else(|| config.default_workspace_id.clone())
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum TabCommand {
    /// Print the Today / Tomorrow / Upcoming lists once
    Show,
    /// Keep printing the lists as they change
    Watch,
    /// Create a task assigned to you
    Create {
        /// Defaults to `default_workspace_id` from the config file
        #[arg(long)]
        workspace: Option<String>,
        title: String,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Mark a task complete
    Done { task_id: String },
}
