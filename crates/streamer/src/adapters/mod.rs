//! Transport adapters implementing the feed connection ports

mod memory;
mod websocket;

pub use memory::{ChannelConnector, ChannelListener, ChannelPeer};
pub use websocket::WebSocketConnector;
