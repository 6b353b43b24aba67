//! Per-tab state: the last snapshot from the engine plus optimistic edits.
//!
//! `TabState` never talks to the channel itself. Methods that change tasks
//! return the `TabMessage` the caller should send, and everything the engine
//! sends back goes through `apply`.
//!
//! Optimistic edits are kept as a list of pending mutations replayed on top
//! of every snapshot. A mutation the engine has confirmed carries the epoch
//! it was confirmed at, and is only dropped once a snapshot whose `as_of`
//! reaches that epoch arrives, since only such a snapshot is guaranteed to
//! contain the server's version.

use crate::channel::{EngineMessage, MutationId, TabMessage};
use crate::model::{
    is_temporary_id, ModelError, NewTask, Snapshot, Task, TaskChanges, Workspace, WorkspaceColors,
};
use crate::sync::SyncStatus;
use crate::view::{self, Buckets};
use chrono::{DateTime, TimeZone};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Change {
    /// A task created here that the server has not confirmed; holds the temporary task
    Create(Task),
    Update { task_id: String, changes: TaskChanges },
    /// The server's version of the task; replaces `replaces` and any task with the same id
    Confirmed { task: Task, replaces: String },
}

#[derive(Debug, Clone)]
struct Pending {
    id: MutationId,
    change: Change,
    confirmed_epoch: Option<u64>,
}

#[derive(Debug, Default)]
pub struct TabState {
    base: Snapshot,
    tasks: Vec<Task>,
    status: SyncStatus,
    is_from_local_cache: bool,
    as_of: u64,
    pending: Vec<Pending>,
    last_error: Option<String>,
}

impl TabState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks as the user should see them, optimistic edits included.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.base.workspaces
    }

    pub fn workspace_colors(&self) -> &WorkspaceColors {
        &self.base.workspace_colors
    }

    pub fn color_for(&self, task: &Task) -> Option<&str> {
        self.base.color_for(task.workspace_id())
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_online(&self) -> bool {
        self.status == SyncStatus::Online
    }

    pub fn is_from_local_cache(&self) -> bool {
        self.is_from_local_cache
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reason of the last failed pull or mutation, cleared by the next fresh snapshot.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn request_pull(&self) -> TabMessage {
        TabMessage::RequestPull
    }

    pub fn mark_done(&mut self, task_id: &str) -> Option<TabMessage> {
        self.update_task(task_id, TaskChanges::completed(true))
    }

    /// Apply `changes` locally and return the message to forward.
    ///
    /// Returns `None` for empty changes and for tasks the server has not
    /// assigned an id to yet.
    pub fn update_task(&mut self, task_id: &str, changes: TaskChanges) -> Option<TabMessage> {
        if changes.is_empty() || is_temporary_id(task_id) {
            return None;
        }
        let mutation_id = Uuid::new_v4();
        self.pending.push(Pending {
            id: mutation_id,
            change: Change::Update {
                task_id: task_id.to_string(),
                changes: changes.clone(),
            },
            confirmed_epoch: None,
        });
        self.rebuild();
        Some(TabMessage::UpdateTask {
            mutation_id,
            task_id: task_id.to_string(),
            fields: changes,
        })
    }

    /// Show a temporary task right away and return the message to forward.
    pub fn create_task(
        &mut self,
        workspace_id: &str,
        fields: NewTask,
    ) -> Result<TabMessage, ModelError> {
        let token = Uuid::new_v4();
        let mut task = Task::temporary(token, workspace_id, &fields)?;
        if let Some(workspace) = self.base.workspace(workspace_id) {
            task = task.tagged(workspace);
        }
        self.pending.push(Pending {
            id: token,
            change: Change::Create(task),
            confirmed_epoch: None,
        });
        self.rebuild();
        Ok(TabMessage::CreateTask {
            mutation_id: token,
            workspace_id: workspace_id.to_string(),
            fields,
        })
    }

    pub fn apply(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::SnapshotUpdate {
                snapshot,
                is_from_local_cache,
                status,
                as_of,
            } => {
                self.base = snapshot;
                self.status = status;
                self.is_from_local_cache = is_from_local_cache;
                self.as_of = self.as_of.max(as_of);
                if !is_from_local_cache {
                    self.last_error = None;
                }
                let seen = self.as_of;
                self.pending
                    .retain(|p| p.confirmed_epoch.map_or(true, |epoch| epoch > seen));
            }
            EngineMessage::PullFailed { status, reason } => {
                self.status = status;
                self.last_error = Some(reason);
                return;
            }
            EngineMessage::MutationApplied {
                mutation_id,
                task,
                epoch,
            } => {
                let seen = self.as_of;
                let Some(index) = self.pending.iter().position(|p| p.id == mutation_id) else {
                    return;
                };
                if epoch <= seen {
                    self.pending.remove(index);
                } else {
                    let pending = &mut self.pending[index];
                    let replaces = match &pending.change {
                        Change::Create(temporary) => temporary.id().to_string(),
                        Change::Update { task_id, .. } => task_id.clone(),
                        Change::Confirmed { replaces, .. } => replaces.clone(),
                    };
                    pending.change = Change::Confirmed { task, replaces };
                    pending.confirmed_epoch = Some(epoch);
                }
            }
            EngineMessage::MutationFailed {
                mutation_id,
                reason,
            } => {
                self.pending.retain(|p| p.id != mutation_id);
                self.last_error = Some(reason);
            }
        }
        self.rebuild();
    }

    /// Recompute the visible tasks from the snapshot and pending mutations.
    fn rebuild(&mut self) {
        let mut tasks = self.base.tasks.clone();
        for pending in &self.pending {
            match &pending.change {
                Change::Create(task) => {
                    if !tasks.iter().any(|t| t.id() == task.id()) {
                        tasks.push(task.clone());
                    }
                }
                Change::Update { task_id, changes } => {
                    if let Some(task) = tasks.iter_mut().find(|t| t.id() == task_id) {
                        *task = task.apply_changes(changes);
                    }
                }
                Change::Confirmed { task, replaces } => {
                    tasks.retain(|t| t.id() != replaces && t.id() != task.id());
                    let task = match self.base.workspace(task.workspace_id()) {
                        Some(workspace) => task.clone().tagged(workspace),
                        None => task.clone(),
                    };
                    tasks.push(task);
                }
            }
        }
        self.tasks = tasks;
    }

    pub fn buckets<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Buckets<'_> {
        view::partition(&self.tasks, now)
    }
}
