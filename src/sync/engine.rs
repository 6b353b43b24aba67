//! The sync engine.
//!
//! One engine owns the cached `Snapshot`. It runs as a single task that
//! pulls on a fixed interval and whenever a tab asks, so pulls never
//! overlap. Requests that queue up while a pull runs are served by the
//! next pull together. Mutations from tabs are forwarded to the remote service in
//! spawned tasks and followed by a fresh pull.

use super::status::{StatusTracker, SyncStatus};
use crate::api::{ApiError, TaskService, TASK_FIELDS};
use crate::channel::{
    ChannelHub, ConnectionId, EngineMessage, HubEvent, MutationId, ProtocolError, TabMessage,
    TabPort, CHANNEL_NAME,
};
use crate::color::merge_colors;
use crate::model::{NewTask, Snapshot, TaskChanges};
use crate::store::SnapshotStore;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 32;
const HUB_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pull_interval: Duration,
    /// Consecutive failures before `Online` drops to `Offline`.
    pub offline_after_failures: u32,
    /// Per-tab queue length.
    pub channel_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_secs(60),
            offline_after_failures: 3,
            channel_buffer: 64,
        }
    }
}

/// Why a pull failed.
#[derive(Debug, thiserror::Error)]
pub enum PullError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("no workspaces available")]
    NoWorkspaces,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug)]
enum Command {
    Pull,
    Shutdown,
}

#[derive(Debug)]
enum Mutation {
    Create {
        workspace_id: String,
        fields: NewTask,
    },
    Update {
        task_id: String,
        changes: TaskChanges,
    },
}

struct EngineState {
    snapshot: Snapshot,
    status: StatusTracker,
    /// Epoch at the start of the pull that produced `snapshot`
    as_of: u64,
}

/// Receivers driven by `SyncEngine::run`.
pub struct EngineLoop {
    commands: mpsc::Receiver<Command>,
    hub_events: mpsc::Receiver<HubEvent>,
}

pub struct SyncEngine {
    service: Arc<dyn TaskService>,
    store: Arc<dyn SnapshotStore>,
    hub: Arc<ChannelHub>,
    state: RwLock<EngineState>,
    /// Count of mutations the remote service has confirmed
    epoch: AtomicU64,
    commands: mpsc::Sender<Command>,
    config: EngineConfig,
}

impl SyncEngine {
    /// Build an engine without starting it.
    ///
    /// The returned `EngineLoop` must be kept alive (and normally passed to
    /// `run`) for tabs to be able to connect.
    pub fn new(
        service: Arc<dyn TaskService>,
        store: Arc<dyn SnapshotStore>,
        config: EngineConfig,
    ) -> (Arc<Self>, EngineLoop) {
        let (event_tx, event_rx) = mpsc::channel(HUB_EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let hub = Arc::new(ChannelHub::new(event_tx, config.channel_buffer));

        let engine = Arc::new(Self {
            service,
            store,
            hub,
            state: RwLock::new(EngineState {
                snapshot: Snapshot::default(),
                status: StatusTracker::new(config.offline_after_failures),
                as_of: 0,
            }),
            epoch: AtomicU64::new(0),
            commands: command_tx,
            config,
        });

        let runner = EngineLoop {
            commands: command_rx,
            hub_events: event_rx,
        };
        (engine, runner)
    }

    /// Load the cache and spawn the engine loop. The first pull starts immediately.
    pub async fn start(
        service: Arc<dyn TaskService>,
        store: Arc<dyn SnapshotStore>,
        config: EngineConfig,
    ) -> SyncHandle {
        let (engine, runner) = Self::new(service, store, config);
        engine.load_cached().await;
        engine.log_current_user().await;
        tokio::spawn(engine.clone().run(runner));
        SyncHandle { engine }
    }

    /// Replace the in-memory snapshot with the stored one.
    pub async fn load_cached(&self) {
        match self.store.read_snapshot().await {
            Ok(snapshot) => {
                let orphans = snapshot.orphaned_tasks().len();
                if orphans > 0 {
                    warn!("[engine] Cached snapshot has {} orphaned tasks", orphans);
                }
                info!(
                    "[engine] Loaded {} cached tasks in {} workspaces",
                    snapshot.tasks.len(),
                    snapshot.workspaces.len()
                );
                self.state.write().await.snapshot = snapshot;
            }
            Err(e) => warn!("[engine] Failed to read cached snapshot: {}", e),
        }
    }

    async fn log_current_user(&self) {
        if !self.service.is_authenticated().await {
            info!("[engine] No session yet, tabs will see offline status");
            return;
        }
        match self.service.current_user().await {
            Ok(user) => info!("[engine] Signed in as {} ({})", user.name, user.id),
            Err(e) => warn!("[engine] Failed to fetch current user: {}", e),
        }
    }

    pub async fn run(self: Arc<Self>, mut runner: EngineLoop) {
        let mut interval = tokio::time::interval(self.config.pull_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "[engine] Started, pulling every {}s",
            self.config.pull_interval.as_secs()
        );

        loop {
            let wants_pull = tokio::select! {
                _ = interval.tick() => true,
                Some(command) = runner.commands.recv() => match command {
                    Command::Pull => true,
                    Command::Shutdown => {
                        info!("[engine] Shutting down");
                        break;
                    }
                },
                Some(event) = runner.hub_events.recv() => self.handle_hub_event(event).await,
                else => break,
            };
            if !wants_pull {
                continue;
            }
            if !self.drain_pending(&mut runner).await {
                info!("[engine] Shutting down");
                break;
            }
            self.pull().await;
            // The next scheduled pull is one interval after this one
            interval.reset();
        }
    }

    /// Handle everything already queued before a pull starts, so that any
    /// number of queued pull requests is served by that one pull. Returns
    /// false if a shutdown was queued.
    async fn drain_pending(self: &Arc<Self>, runner: &mut EngineLoop) -> bool {
        let mut folded = 0;
        while let Ok(command) = runner.commands.try_recv() {
            match command {
                Command::Pull => folded += 1,
                Command::Shutdown => return false,
            }
        }
        for _ in 0..HUB_EVENT_BUFFER {
            let Ok(event) = runner.hub_events.try_recv() else {
                break;
            };
            if self.handle_hub_event(event).await {
                folded += 1;
            }
        }
        if folded > 0 {
            debug!("[engine] Folded {} queued pull requests into one pull", folded);
        }
        true
    }

    /// Returns whether the event asks for a pull.
    async fn handle_hub_event(self: &Arc<Self>, event: HubEvent) -> bool {
        match event {
            HubEvent::Connected(id) => {
                self.send_cached(id).await;
                true
            }
            HubEvent::Message(_, TabMessage::RequestPull) => true,
            HubEvent::Message(
                id,
                TabMessage::CreateTask {
                    mutation_id,
                    workspace_id,
                    fields,
                },
            ) => {
                self.spawn_mutation(
                    id,
                    mutation_id,
                    Mutation::Create {
                        workspace_id,
                        fields,
                    },
                );
                false
            }
            HubEvent::Message(
                id,
                TabMessage::UpdateTask {
                    mutation_id,
                    task_id,
                    fields,
                },
            ) => {
                self.spawn_mutation(
                    id,
                    mutation_id,
                    Mutation::Update {
                        task_id,
                        changes: fields,
                    },
                );
                false
            }
            HubEvent::Disconnected(id) => {
                debug!("[engine] Tab {} gone", id);
                false
            }
        }
    }

    /// Run one pull and publish the outcome. Never fails: errors become a
    /// status transition and a `PullFailed` broadcast, and the cached
    /// snapshot is left as it was.
    pub async fn pull(&self) -> SyncStatus {
        let as_of = self.epoch.load(Ordering::SeqCst);
        match self.fetch().await {
            Ok(snapshot) => {
                if let Err(e) = self.store.write_snapshot(&snapshot).await {
                    warn!("[engine] Failed to persist snapshot: {}", e);
                }
                info!(
                    "[engine] Pulled {} tasks from {} workspaces",
                    snapshot.tasks.len(),
                    snapshot.workspaces.len()
                );
                let status = {
                    let mut state = self.state.write().await;
                    state.snapshot = snapshot.clone();
                    state.as_of = as_of;
                    state.status.record_success()
                };
                self.hub
                    .broadcast(&EngineMessage::SnapshotUpdate {
                        snapshot,
                        is_from_local_cache: false,
                        status,
                        as_of,
                    })
                    .await;
                status
            }
            Err(e) => {
                let status = self.state.write().await.status.record_failure();
                warn!("[engine] Pull failed ({:?}): {}", status, e);
                self.hub
                    .broadcast(&EngineMessage::PullFailed {
                        status,
                        reason: e.to_string(),
                    })
                    .await;
                status
            }
        }
    }

    async fn fetch(&self) -> Result<Snapshot, PullError> {
        if !self.service.is_authenticated().await {
            return Err(PullError::NotAuthenticated);
        }

        let workspaces = self.service.list_workspaces().await?;
        if workspaces.is_empty() {
            return Err(PullError::NoWorkspaces);
        }

        let fetches = workspaces.iter().map(|workspace| async move {
            let result = self.service.list_tasks(workspace.id(), TASK_FIELDS).await;
            (workspace, result)
        });

        let mut tasks = Vec::new();
        for (workspace, result) in join_all(fetches).await {
            match result {
                Ok(list) => tasks.extend(list.into_iter().map(|t| t.tagged(workspace))),
                // One failing workspace only drops out of this pull
                Err(e) => warn!(
                    "[engine] Skipping workspace {} this pull: {}",
                    workspace.id(),
                    e
                ),
            }
        }

        let previous = self.state.read().await.snapshot.workspace_colors.clone();
        let workspace_colors = merge_colors(&previous, &workspaces);
        Ok(Snapshot::new(tasks, workspaces, workspace_colors))
    }

    /// Send the cached snapshot to a single tab.
    async fn send_cached(&self, id: ConnectionId) {
        let message = {
            let state = self.state.read().await;
            EngineMessage::SnapshotUpdate {
                snapshot: state.snapshot.clone(),
                is_from_local_cache: true,
                status: state.status.status(),
                as_of: state.as_of,
            }
        };
        self.hub.send_to(id, message).await;
    }

    fn spawn_mutation(self: &Arc<Self>, origin: ConnectionId, mutation_id: MutationId, mutation: Mutation) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if engine.forward_mutation(origin, mutation_id, mutation).await {
                let _ = engine.commands.send(Command::Pull).await;
            }
        });
    }

    /// Forward a mutation and report the outcome to the tab that sent it.
    /// Returns whether the remote service accepted it.
    async fn forward_mutation(
        &self,
        origin: ConnectionId,
        mutation_id: MutationId,
        mutation: Mutation,
    ) -> bool {
        let result = if !self.service.is_authenticated().await {
            Err(ApiError::Auth)
        } else {
            match &mutation {
                Mutation::Create {
                    workspace_id,
                    fields,
                } => self.service.create_task(workspace_id, fields).await,
                Mutation::Update { task_id, changes } => {
                    self.service.update_task(task_id, changes).await
                }
            }
        };

        match result {
            Ok(task) => {
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                info!("[engine] Mutation {} applied as task {}", mutation_id, task.id());
                self.hub
                    .send_to(
                        origin,
                        EngineMessage::MutationApplied {
                            mutation_id,
                            task,
                            epoch,
                        },
                    )
                    .await;
                true
            }
            Err(e) => {
                warn!("[engine] Mutation {} ({:?}) failed: {}", mutation_id, mutation, e);
                self.hub
                    .send_to(
                        origin,
                        EngineMessage::MutationFailed {
                            mutation_id,
                            reason: e.to_string(),
                        },
                    )
                    .await;
                false
            }
        }
    }

    pub fn hub(&self) -> Arc<ChannelHub> {
        self.hub.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.read().await.status.status()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    engine: Arc<SyncEngine>,
}

impl SyncHandle {
    /// Queue a pull. Returns false if the engine has stopped.
    pub async fn request_pull(&self) -> bool {
        self.engine.commands.send(Command::Pull).await.is_ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.engine.commands.send(Command::Shutdown).await;
    }

    /// Open an in-process tab channel.
    pub async fn connect(&self) -> Result<TabPort, ProtocolError> {
        self.engine.hub.connect(CHANNEL_NAME).await
    }

    pub fn hub(&self) -> Arc<ChannelHub> {
        self.engine.hub()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.engine.snapshot().await
    }

    pub async fn status(&self) -> SyncStatus {
        self.engine.status().await
    }
}
