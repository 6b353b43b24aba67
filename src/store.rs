//! Local persistent store for the cached snapshot.
//!
//! The snapshot is kept under three keys (tasks, workspaces, colors), each a
//! JSON blob, and is always read and written as a whole. A missing or
//! undecodable key means none of the three is trusted.

use crate::model::{Snapshot, Task, Workspace, WorkspaceColors};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

pub const ALL_TASKS_KEY: &str = "all_tasks";
pub const ALL_WORKSPACES_KEY: &str = "all_workspaces";
pub const WORKSPACE_COLORS_KEY: &str = "all_workspace_colors";

const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Join(String),
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The last written snapshot, or an empty one.
    async fn read_snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Replace the stored snapshot.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Snapshot store backed by a redb file. Writes happen in a single transaction.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read_blocking(db: &Database) -> Result<Snapshot, StoreError> {
        let txn = db.begin_read().map_err(db_err)?;
        let table = match txn.open_table(SNAPSHOT_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Snapshot::default()),
            Err(e) => return Err(db_err(e)),
        };

        let mut blobs = Vec::with_capacity(3);
        for key in [ALL_TASKS_KEY, ALL_WORKSPACES_KEY, WORKSPACE_COLORS_KEY] {
            match table.get(key).map_err(db_err)? {
                Some(guard) => blobs.push(guard.value().to_vec()),
                None => return Ok(Snapshot::default()),
            }
        }

        match decode_snapshot(&blobs[0], &blobs[1], &blobs[2]) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("[store] Discarding undecodable snapshot: {}", e);
                Ok(Snapshot::default())
            }
        }
    }

    fn write_blocking(db: &Database, snapshot: &Snapshot) -> Result<(), StoreError> {
        let tasks = serde_json::to_vec(&snapshot.tasks)?;
        let workspaces = serde_json::to_vec(&snapshot.workspaces)?;
        let colors = serde_json::to_vec(&snapshot.workspace_colors)?;

        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(SNAPSHOT_TABLE).map_err(db_err)?;
            table
                .insert(ALL_TASKS_KEY, tasks.as_slice())
                .map_err(db_err)?;
            table
                .insert(ALL_WORKSPACES_KEY, workspaces.as_slice())
                .map_err(db_err)?;
            table
                .insert(WORKSPACE_COLORS_KEY, colors.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }
}

fn decode_snapshot(tasks: &[u8], workspaces: &[u8], colors: &[u8]) -> Result<Snapshot, StoreError> {
    let tasks: Vec<Task> = serde_json::from_slice(tasks)?;
    let workspaces: Vec<Workspace> = serde_json::from_slice(workspaces)?;
    let colors: WorkspaceColors = serde_json::from_slice(colors)?;
    Ok(Snapshot::new(tasks, workspaces, colors))
}

#[async_trait]
impl SnapshotStore for RedbStore {
    async fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&db))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let db = self.db.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || Self::write_blocking(&db, &snapshot))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// In-memory store, for tests and for running without a database file.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: RwLock<Option<Snapshot>>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            writes: Default::default(),
        }
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.snapshot.read().await.clone().unwrap_or_default())
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
