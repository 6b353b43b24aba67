//! Background synchronization: pulls from the remote service, keeps the
//! cached snapshot, and pushes it to every connected tab.

pub mod engine;
pub mod status;

pub use engine::{EngineConfig, PullError, SyncEngine, SyncHandle};
pub use status::{StatusTracker, SyncStatus};
