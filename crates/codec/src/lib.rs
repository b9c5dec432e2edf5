//! Tickstream codec
//!
//! Turns inbound binary frames into domain [`Tick`](tickstream_core::Tick)s
//! and status messages, and builds the outbound JSON control requests.
//!
//! Decoding is per frame and stateless: a corrupt or unknown frame yields a
//! [`DecodeError`] and has no effect on the frames that follow it.

pub mod error;
pub mod wire;

mod decode;
mod encode;
mod message;
mod request;

pub use decode::decode;
pub use encode::{encode_control, encode_frame, encode_market_status, encode_ticks};
pub use error::{DecodeError, DecodeResult, EncodeError};
pub use message::{ControlMessage, FeedMessage, TickBatch};
pub use request::{FeedRequest, RequestData, RequestMethod};
pub use wire::{MessageKind, SCHEMA_V1, SCHEMA_V2};
