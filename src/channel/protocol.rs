//! Message types exchanged between tabs and the sync engine.
//!
//! Messages are JSON objects tagged by a `type` field. Every frame on the
//! WebSocket is one message.

use crate::model::{NewTask, Snapshot, Task, TaskChanges};
use crate::sync::SyncStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the one channel tabs may open.
pub const CHANNEL_NAME: &str = "asanatabs";

/// Identifies an optimistic mutation; for creates it is also the correlation
/// token embedded in the temporary task id.
pub type MutationId = Uuid;

/// Tab to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TabMessage {
    /// Pull from the remote service now.
    RequestPull,
    #[serde(rename_all = "camelCase")]
    CreateTask {
        mutation_id: MutationId,
        workspace_id: String,
        fields: NewTask,
    },
    #[serde(rename_all = "camelCase")]
    UpdateTask {
        mutation_id: MutationId,
        task_id: String,
        fields: TaskChanges,
    },
}

/// Engine to tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineMessage {
    /// A full snapshot. `as_of` is the mutation epoch at the start of the pull
    /// that produced it.
    #[serde(rename_all = "camelCase")]
    SnapshotUpdate {
        snapshot: Snapshot,
        is_from_local_cache: bool,
        status: SyncStatus,
        as_of: u64,
    },
    #[serde(rename_all = "camelCase")]
    PullFailed { status: SyncStatus, reason: String },
    /// The remote service accepted a mutation; it is reflected in every
    /// snapshot with `as_of >= epoch`.
    #[serde(rename_all = "camelCase")]
    MutationApplied {
        mutation_id: MutationId,
        task: Task,
        epoch: u64,
    },
    #[serde(rename_all = "camelCase")]
    MutationFailed {
        mutation_id: MutationId,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("channel closed")]
    Closed,
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_tab_message(text: &str) -> Result<TabMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_engine_message(text: &str) -> Result<EngineMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
