//! JSON shapes of the Asana REST API.

use crate::model::{DueDate, ModelError, Task, User, Workspace};
use serde::{Deserialize, Serialize};

/// Every response body is wrapped in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub message: String,
}

/// POST/PUT bodies carry the client identifier next to the data.
#[derive(Debug, Serialize)]
pub(crate) struct DataBody<'a, T: Serialize> {
    pub data: T,
    pub options: ClientOptions<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClientOptions<'a> {
    pub client_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTaskData<'a, T: Serialize> {
    #[serde(flatten)]
    pub fields: &'a T,
    pub assignee: &'static str,
    pub workspace: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRef {
    pub gid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireWorkspace {
    pub gid: String,
    #[serde(default)]
    pub name: String,
}

impl TryFrom<WireWorkspace> for Workspace {
    type Error = ModelError;

    fn try_from(wire: WireWorkspace) -> Result<Self, Self::Error> {
        Workspace::new(wire.gid, wire.name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTask {
    pub gid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub due_on: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub workspace: Option<WireRef>,
}

impl WireTask {
    /// Convert to a task; `workspace_id` is used when the response omits it.
    pub fn into_task(self, workspace_id: &str) -> Result<Task, ModelError> {
        let workspace = self
            .workspace
            .map(|w| w.gid)
            .unwrap_or_else(|| workspace_id.to_string());
        // due_at is the more precise of the two when both are set
        let due = match (self.due_at.as_deref(), self.due_on.as_deref()) {
            (Some(at), _) => Some(DueDate::parse(at)?),
            (None, Some(on)) => Some(DueDate::parse(on)?),
            (None, None) => None,
        };
        Ok(Task::new(self.gid, self.name, workspace)?
            .with_due(due)
            .with_completed(self.completed))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub gid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        User {
            id: wire.gid,
            name: wire.name,
            email: wire.email,
        }
    }
}
