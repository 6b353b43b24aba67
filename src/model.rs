//! Core records shared by the sync engine, the store, the channel and the tabs.
//!
//! Records are immutable once built: changing a task produces a new `Task`.
//! Every constructor validates the identifiers a snapshot relies on, and
//! deserialization goes through the same constructors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Prefix reserved for ids of tasks that the remote service has not confirmed.
pub const TEMPORARY_ID_PREFIX: &str = "local-";

/// Errors from building or parsing model records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{0} id must not be empty")]
    EmptyId(&'static str),
    #[error("task {0} has no workspace")]
    MissingWorkspace(String),
    #[error("unrecognized due date: {0}")]
    InvalidDueDate(String),
}

/// Workspace color assignments, keyed by workspace id.
pub type WorkspaceColors = BTreeMap<String, String>;

/// Build the temporary id for a locally created task.
pub fn temporary_id(token: Uuid) -> String {
    format!("{}{}", TEMPORARY_ID_PREFIX, token)
}

/// Whether an id was generated locally for a not-yet-confirmed task.
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMPORARY_ID_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkspace")]
pub struct Workspace {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct RawWorkspace {
    id: String,
    name: String,
}

impl TryFrom<RawWorkspace> for Workspace {
    type Error = ModelError;

    fn try_from(raw: RawWorkspace) -> Result<Self, Self::Error> {
        Workspace::new(raw.id, raw.name)
    }
}

impl Workspace {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ModelError::EmptyId("workspace"));
        }
        Ok(Self {
            id,
            name: name.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// When a task is due.
///
/// Date-only and timezone-naive values are interpreted in the viewer's local
/// zone; `At` is an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DueDate {
    /// `YYYY-MM-DD`, due at local midnight
    On(NaiveDate),
    /// `YYYY-MM-DDTHH:MM[:SS]` with no offset
    Floating(NaiveDateTime),
    /// RFC 3339 instant
    At(DateTime<Utc>),
}

impl DueDate {
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(DueDate::On(date));
        }
        if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
            return Ok(DueDate::At(instant.with_timezone(&Utc)));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(DueDate::Floating(naive));
            }
        }
        Err(ModelError::InvalidDueDate(value.to_string()))
    }

    /// Resolve to an instant in the given zone.
    ///
    /// Returns `None` only when a local time does not exist in `tz`
    /// (inside a DST gap).
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        match self {
            DueDate::On(date) => tz
                .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
                .earliest(),
            DueDate::Floating(naive) => tz.from_local_datetime(naive).earliest(),
            DueDate::At(instant) => Some(instant.with_timezone(tz)),
        }
    }
}

impl fmt::Display for DueDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DueDate::Floating(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")),
            DueDate::At(instant) => {
                write!(f, "{}", instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl TryFrom<String> for DueDate {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DueDate::parse(&value)
    }
}

impl From<DueDate> for String {
    fn from(due: DueDate) -> Self {
        due.to_string()
    }
}

/// Fields for a task that is about to be created remotely.
///
/// Field names follow the remote API, since this payload is forwarded as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn due(&self) -> Option<DueDate> {
        self.due_at
            .map(DueDate::At)
            .or(self.due_on.map(DueDate::On))
    }
}

/// A partial task update. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskChanges {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.completed.is_none()
            && self.due_on.is_none()
            && self.due_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTask", rename_all = "camelCase")]
pub struct Task {
    id: String,
    title: String,
    workspace_id: String,
    workspace_name: String,
    due: Option<DueDate>,
    completed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    id: String,
    #[serde(default)]
    title: String,
    workspace_id: String,
    #[serde(default)]
    workspace_name: String,
    #[serde(default)]
    due: Option<DueDate>,
    #[serde(default)]
    completed: bool,
}

impl TryFrom<RawTask> for Task {
    type Error = ModelError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        Ok(Task::new(raw.id, raw.title, raw.workspace_id)?
            .with_workspace_name(raw.workspace_name)
            .with_due(raw.due)
            .with_completed(raw.completed))
    }
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let workspace_id = workspace_id.into();
        if id.is_empty() {
            return Err(ModelError::EmptyId("task"));
        }
        if workspace_id.is_empty() {
            return Err(ModelError::MissingWorkspace(id));
        }
        Ok(Self {
            id,
            title: title.into(),
            workspace_id,
            workspace_name: String::new(),
            due: None,
            completed: false,
        })
    }

    /// A placeholder for a task whose creation has not been confirmed.
    /// The correlation token becomes part of the id.
    pub fn temporary(
        token: Uuid,
        workspace_id: impl Into<String>,
        fields: &NewTask,
    ) -> Result<Self, ModelError> {
        Ok(Task::new(temporary_id(token), fields.name.clone(), workspace_id)?.with_due(fields.due()))
    }

    pub fn with_workspace_name(mut self, name: impl Into<String>) -> Self {
        self.workspace_name = name.into();
        self
    }

    pub fn with_due(mut self, due: Option<DueDate>) -> Self {
        self.due = due;
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Tag the task with the workspace it was fetched from.
    pub fn tagged(mut self, workspace: &Workspace) -> Self {
        self.workspace_id = workspace.id().to_string();
        self.workspace_name = workspace.name().to_string();
        self
    }

    /// The task as it looks after `changes` are applied.
    pub fn apply_changes(&self, changes: &TaskChanges) -> Self {
        let mut task = self.clone();
        if let Some(ref name) = changes.name {
            task.title = name.clone();
        }
        if let Some(completed) = changes.completed {
            task.completed = completed;
        }
        if let Some(due_at) = changes.due_at {
            task.due = Some(DueDate::At(due_at));
        } else if let Some(due_on) = changes.due_on {
            task.due = Some(DueDate::On(due_on));
        }
        task
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn workspace_name(&self) -> &str {
        &self.workspace_name
    }

    pub fn due(&self) -> Option<DueDate> {
        self.due
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The full cached state: the unit of persistence and of broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub workspaces: Vec<Workspace>,
    pub workspace_colors: WorkspaceColors,
}

impl Snapshot {
    pub fn new(tasks: Vec<Task>, workspaces: Vec<Workspace>, workspace_colors: WorkspaceColors) -> Self {
        Self {
            tasks,
            workspaces,
            workspace_colors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.workspaces.is_empty() && self.workspace_colors.is_empty()
    }

    pub fn workspace(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id() == id)
    }

    pub fn color_for(&self, workspace_id: &str) -> Option<&str> {
        self.workspace_colors.get(workspace_id).map(String::as_str)
    }

    /// Tasks whose workspace is missing from the snapshot, or has no color.
    pub fn orphaned_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| {
                self.workspace(t.workspace_id()).is_none()
                    || !self.workspace_colors.contains_key(t.workspace_id())
            })
            .collect()
    }
}
