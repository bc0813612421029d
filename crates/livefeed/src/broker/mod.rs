//! The session push channel: one broker task per session, shared by every
//! attached tab port, fanning out typed events from a single server push
//! stream.

pub mod hub;
pub mod transport;

pub use hub::{BrokerHandle, Navigator, Port, spawn_broker};
pub use transport::{ConnectError, PushConnector};
