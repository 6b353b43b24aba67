//! Registry of connected tabs.
//!
//! Each tab owns a bounded queue of engine messages. Delivery is
//! at-most-once: a message for a full queue is dropped, and a tab whose
//! queue is closed is unregistered on the next send.

use super::protocol::{EngineMessage, ProtocolError, TabMessage, CHANNEL_NAME};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique id of one tab connection.
pub type ConnectionId = Uuid;

/// What the hub reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Connected(ConnectionId),
    Message(ConnectionId, TabMessage),
    Disconnected(ConnectionId),
}

pub struct ChannelHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<EngineMessage>>>,
    events: mpsc::Sender<HubEvent>,
    buffer: usize,
}

impl ChannelHub {
    /// Create a hub that reports to `events` and gives every tab a queue of `buffer` messages.
    pub fn new(events: mpsc::Sender<HubEvent>, buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            events,
            buffer: buffer.max(1),
        }
    }

    /// Open a channel for a new tab.
    pub async fn connect(&self, name: &str) -> Result<TabPort, ProtocolError> {
        if name != CHANNEL_NAME {
            return Err(ProtocolError::UnknownChannel(name.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.connections.write().await.insert(id, tx);
        info!("[hub] Tab {} connected", id);

        self.events
            .send(HubEvent::Connected(id))
            .await
            .map_err(|_| ProtocolError::Closed)?;

        Ok(TabPort {
            sender: TabSender {
                id,
                events: self.events.clone(),
            },
            incoming: rx,
        })
    }

    /// Unregister a tab.
    ///
    /// The engine itself calls this while broadcasting, so the
    /// `Disconnected` event must never wait on the engine's own queue. When
    /// that queue is full the event is dropped.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.connections.write().await.remove(&id).is_some() {
            info!("[hub] Tab {} disconnected", id);
            if self.events.try_send(HubEvent::Disconnected(id)).is_err() {
                debug!("[hub] Event queue full, not reporting disconnect of {}", id);
            }
        }
    }

    /// Send to one tab. Returns false if the message was dropped.
    pub async fn send_to(&self, id: ConnectionId, message: EngineMessage) -> bool {
        let result = {
            let connections = self.connections.read().await;
            match connections.get(&id) {
                Some(tx) => tx.try_send(message),
                None => return false,
            }
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("[hub] Queue full for tab {}, dropping message", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.disconnect(id).await;
                false
            }
        }
    }

    /// Send to every tab. Returns how many queues accepted the message.
    pub async fn broadcast(&self, message: &EngineMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, tx) in connections.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!("[hub] Queue full for tab {}, dropping message", id);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        for id in closed {
            self.disconnect(id).await;
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// The tab side of a channel.
pub struct TabPort {
    sender: TabSender,
    incoming: mpsc::Receiver<EngineMessage>,
}

impl TabPort {
    pub fn id(&self) -> ConnectionId {
        self.sender.id
    }

    pub async fn send(&self, message: TabMessage) -> Result<(), ProtocolError> {
        self.sender.send(message).await
    }

    /// Next message from the engine; `None` once the tab is unregistered.
    pub async fn recv(&mut self) -> Option<EngineMessage> {
        self.incoming.recv().await
    }

    /// Split into halves that can be driven from separate tasks.
    pub fn into_parts(self) -> (TabSender, mpsc::Receiver<EngineMessage>) {
        (self.sender, self.incoming)
    }
}

/// Sending half of a `TabPort`.
#[derive(Clone)]
pub struct TabSender {
    id: ConnectionId,
    events: mpsc::Sender<HubEvent>,
}

impl TabSender {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send(&self, message: TabMessage) -> Result<(), ProtocolError> {
        self.events
            .send(HubEvent::Message(self.id, message))
            .await
            .map_err(|_| ProtocolError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;
    use crate::sync::SyncStatus;

    fn pull_failed() -> EngineMessage {
        EngineMessage::PullFailed {
            status: SyncStatus::Offline,
            reason: "not logged in".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_channel() {
        let (tx, _rx) = mpsc::channel(8);
        let hub = ChannelHub::new(tx, 4);
        assert!(matches!(
            hub.connect("other").await,
            Err(ProtocolError::UnknownChannel(_))
        ));
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_reports_and_forwards_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        let hub = ChannelHub::new(tx, 4);
        let port = hub.connect(CHANNEL_NAME).await.unwrap();

        assert_eq!(rx.recv().await, Some(HubEvent::Connected(port.id())));
        port.send(TabMessage::RequestPull).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(HubEvent::Message(port.id(), TabMessage::RequestPull))
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_tab() {
        let (tx, _rx) = mpsc::channel(8);
        let hub = ChannelHub::new(tx, 4);
        let mut a = hub.connect(CHANNEL_NAME).await.unwrap();
        let mut b = hub.connect(CHANNEL_NAME).await.unwrap();

        assert_eq!(hub.broadcast(&pull_failed()).await, 2);
        assert_eq!(a.recv().await, Some(pull_failed()));
        assert_eq!(b.recv().await, Some(pull_failed()));
    }

    #[tokio::test]
    async fn test_full_queue_drops_messages() {
        let (tx, _rx) = mpsc::channel(8);
        let hub = ChannelHub::new(tx, 1);
        let mut port = hub.connect(CHANNEL_NAME).await.unwrap();

        assert!(hub.send_to(port.id(), pull_failed()).await);
        let update = EngineMessage::SnapshotUpdate {
            snapshot: Snapshot::default(),
            is_from_local_cache: false,
            status: SyncStatus::Online,
            as_of: 0,
        };
        assert!(!hub.send_to(port.id(), update).await);
        assert_eq!(port.recv().await, Some(pull_failed()));
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_port_is_unregistered() {
        let (tx, mut rx) = mpsc::channel(8);
        let hub = ChannelHub::new(tx, 4);
        let port = hub.connect(CHANNEL_NAME).await.unwrap();
        let id = port.id();
        drop(port);

        assert_eq!(hub.broadcast(&pull_failed()).await, 0);
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(rx.recv().await, Some(HubEvent::Connected(id)));
        assert_eq!(rx.recv().await, Some(HubEvent::Disconnected(id)));
    }

    #[tokio::test]
    async fn test_disconnect_with_full_event_queue_does_not_block() {
        // Nobody drains the event queue; Connected(a) and Connected(b) fill it
        let (tx, _rx) = mpsc::channel(2);
        let hub = ChannelHub::new(tx, 4);
        let a = hub.connect(CHANNEL_NAME).await.unwrap();
        let mut b = hub.connect(CHANNEL_NAME).await.unwrap();
        drop(a);

        let delivered = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            hub.broadcast(&pull_failed()),
        )
        .await
        .expect("broadcast blocked on the event queue");
        assert_eq!(delivered, 1);
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(b.recv().await, Some(pull_failed()));
    }
}
