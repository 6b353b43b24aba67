//! The broadcast channel between the sync engine and connected tabs.

pub mod hub;
pub mod protocol;
pub mod ws;

pub use hub::{ChannelHub, ConnectionId, HubEvent, TabPort, TabSender};
pub use protocol::{
    EngineMessage, MutationId, ProtocolError, TabMessage, CHANNEL_NAME,
};
