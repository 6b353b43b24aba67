//! Remote task service: the trait the sync engine talks to, and its Asana
//! implementation.

mod client;
mod wire;

pub use client::{client_name, AsanaClient, DEFAULT_BASE_URL};

use crate::model::{ModelError, NewTask, Task, TaskChanges, User, Workspace};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Fields requested for every task listing.
pub const TASK_FIELDS: &[&str] = &["name", "due_on", "due_at", "completed"];

/// Errors from the remote task service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not logged in")]
    Auth,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] ModelError),
}

/// The remote task service.
///
/// Every call other than `is_authenticated` fails with `ApiError::Auth`
/// when no session credential is available.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Whether a session credential is present. Gate for every other call.
    async fn is_authenticated(&self) -> bool;

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ApiError>;

    /// Incomplete tasks assigned to the current user, at most 100.
    async fn list_tasks(&self, workspace_id: &str, fields: &[&str]) -> Result<Vec<Task>, ApiError>;

    async fn create_task(&self, workspace_id: &str, fields: &NewTask) -> Result<Task, ApiError>;

    /// Partial update; only the fields set in `changes` are sent.
    async fn update_task(&self, task_id: &str, changes: &TaskChanges) -> Result<Task, ApiError>;

    async fn current_user(&self) -> Result<User, ApiError>;
}

/// Where the session credential (the `ticket` cookie) comes from.
#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    None,
    Ticket(String),
    /// Re-read on every check, so logging in takes effect without a restart.
    CookieFile(PathBuf),
}

impl Session {
    pub async fn ticket(&self) -> Option<String> {
        match self {
            Session::None => None,
            Session::Ticket(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            Session::CookieFile(path) => match tokio::fs::read_to_string(path).await {
                Ok(contents) => parse_ticket(&contents),
                Err(e) => {
                    debug!("[api] No session in {:?}: {}", path, e);
                    None
                }
            },
        }
    }
}

/// Extract the ticket from a cookie file.
///
/// Accepts a Netscape cookie jar, a `name=value; ...` header line, or a bare value.
fn parse_ticket(contents: &str) -> Option<String> {
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    for line in &lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() == 7 && fields[5] == "ticket" && !fields[6].is_empty() {
            return Some(fields[6].to_string());
        }
        for pair in line.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name.trim() == "ticket" && !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
    }

    match lines.as_slice() {
        [single] if !single.contains('=') && !single.contains('\t') => Some(single.to_string()),
        _ => None,
    }
}
