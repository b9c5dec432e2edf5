//! Tickstream Ports
//!
//! Port definitions (traits) for the tickstream client.
//! These define the boundary between the streaming session and the byte-level
//! transport, so the session can run against a websocket in production and
//! an in-memory channel in tests.

mod error;
mod frame;
mod transport;

pub use error::{TransportError, TransportResult};
pub use frame::{CloseFrame, Frame};
pub use transport::{FeedConnection, FeedConnector};
