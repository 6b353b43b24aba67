#![allow(dead_code)]

use asanatabs::adapter::TabState;
use asanatabs::api::{ApiError, TaskService};
use asanatabs::channel::{EngineMessage, TabPort};
use asanatabs::model::{NewTask, Task, TaskChanges, User, Workspace};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the remote task service.
///
/// Like the real listing (`completed_since=now`), `list_tasks` only returns
/// incomplete tasks.
pub struct FakeService {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    authenticated: bool,
    workspaces: Vec<Workspace>,
    tasks: BTreeMap<String, Vec<Task>>,
    failing_workspaces: HashSet<String>,
    fail_listing: bool,
    fail_mutations: bool,
    next_id: u64,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                authenticated: true,
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_workspace(self, id: &str, name: &str) -> Self {
        self.add_workspace(id, name);
        self
    }

    pub fn with_task(self, workspace_id: &str, id: &str, title: &str) -> Self {
        self.add_task(Task::new(id, title, workspace_id).unwrap());
        self
    }

    pub fn add_workspace(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.workspaces.push(Workspace::new(id, name).unwrap());
        state.tasks.entry(id.to_string()).or_default();
    }

    pub fn remove_workspace(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.workspaces.retain(|w| w.id() != id);
        state.tasks.remove(id);
    }

    pub fn add_task(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state
            .tasks
            .entry(task.workspace_id().to_string())
            .or_default()
            .push(task);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.lock().unwrap().authenticated = authenticated;
    }

    pub fn fail_workspace(&self, id: &str) {
        self.state.lock().unwrap().failing_workspaces.insert(id.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.state.lock().unwrap().fail_mutations = fail;
    }

    /// Every task the service holds, completed or not.
    pub fn task(&self, id: &str) -> Option<Task> {
        let state = self.state.lock().unwrap();
        state.tasks.values().flatten().find(|t| t.id() == id).cloned()
    }
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 500,
        message: "Server Error".to_string(),
    }
}

#[async_trait]
impl TaskService for FakeService {
    async fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        let state = self.state.lock().unwrap();
        if !state.authenticated {
            return Err(ApiError::Auth);
        }
        if state.fail_listing {
            return Err(server_error());
        }
        Ok(state.workspaces.clone())
    }

    async fn list_tasks(&self, workspace_id: &str, _fields: &[&str]) -> Result<Vec<Task>, ApiError> {
        let state = self.state.lock().unwrap();
        if state.failing_workspaces.contains(workspace_id) {
            return Err(server_error());
        }
        Ok(state
            .tasks
            .get(workspace_id)
            .map(|tasks| tasks.iter().filter(|t| !t.is_completed()).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_task(&self, workspace_id: &str, fields: &NewTask) -> Result<Task, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mutations {
            return Err(server_error());
        }
        state.next_id += 1;
        let task = Task::new(state.next_id.to_string(), fields.name.clone(), workspace_id)?
            .with_due(fields.due());
        state
            .tasks
            .entry(workspace_id.to_string())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, changes: &TaskChanges) -> Result<Task, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mutations {
            return Err(server_error());
        }
        for task in state.tasks.values_mut().flatten() {
            if task.id() == task_id {
                *task = task.apply_changes(changes);
                return Ok(task.clone());
            }
        }
        Err(ApiError::Status {
            status: 404,
            message: "Not Found".to_string(),
        })
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        Ok(User {
            id: "42".to_string(),
            name: "Test User".to_string(),
            email: None,
        })
    }
}

/// Receive until `pred` matches, applying everything received to `state`.
pub async fn recv_applying(
    port: &mut TabPort,
    state: &mut TabState,
    pred: impl Fn(&EngineMessage) -> bool,
) -> EngineMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let message = port.recv().await.expect("channel closed");
            state.apply(message.clone());
            if pred(&message) {
                return message;
            }
        }
    })
    .await
    .expect("timed out waiting for engine message")
}

/// Receive until `pred` matches, discarding everything else.
pub async fn recv_until(
    port: &mut TabPort,
    pred: impl Fn(&EngineMessage) -> bool,
) -> EngineMessage {
    let mut scratch = TabState::new();
    recv_applying(port, &mut scratch, pred).await
}

pub fn is_fresh_snapshot(message: &EngineMessage) -> bool {
    matches!(
        message,
        EngineMessage::SnapshotUpdate {
            is_from_local_cache: false,
            ..
        }
    )
}
