//! Outbound control requests
//!
//! Requests travel as JSON inside binary frames:
//!
//! ```json
//! {"guid":"…","method":"sub","data":{"mode":"full","instrumentKeys":["NSE_EQ|INE002A01018"]}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tickstream_core::{InstrumentKey, SubscriptionMode};
use uuid::Uuid;

use crate::error::EncodeError;

/// Request verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMethod {
    Auth,
    Sub,
    Unsub,
    ChangeMode,
}

/// Request body
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SubscriptionMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instrument_keys: Vec<InstrumentKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for RequestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestData")
            .field("mode", &self.mode)
            .field("instrument_keys", &self.instrument_keys.len())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One outbound request, tagged with a fresh correlation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRequest {
    pub guid: Uuid,
    pub method: RequestMethod,
    pub data: RequestData,
}

impl FeedRequest {
    fn new(method: RequestMethod, data: RequestData) -> Self {
        Self {
            guid: Uuid::new_v4(),
            method,
            data,
        }
    }

    /// Session handshake carrying the access token
    pub fn auth(token: impl Into<String>) -> Self {
        Self::new(
            RequestMethod::Auth,
            RequestData {
                token: Some(token.into()),
                ..RequestData::default()
            },
        )
    }

    pub fn subscribe(mode: SubscriptionMode, keys: Vec<InstrumentKey>) -> Self {
        Self::new(
            RequestMethod::Sub,
            RequestData {
                mode: Some(mode),
                instrument_keys: keys,
                token: None,
            },
        )
    }

    pub fn unsubscribe(keys: Vec<InstrumentKey>) -> Self {
        Self::new(
            RequestMethod::Unsub,
            RequestData {
                mode: None,
                instrument_keys: keys,
                token: None,
            },
        )
    }

    pub fn change_mode(mode: SubscriptionMode, keys: Vec<InstrumentKey>) -> Self {
        Self::new(
            RequestMethod::ChangeMode,
            RequestData {
                mode: Some(mode),
                instrument_keys: keys,
                token: None,
            },
        )
    }

    /// Instrument keys carried by the request
    pub fn instrument_keys(&self) -> &[InstrumentKey] {
        &self.data.instrument_keys
    }

    /// Serialize to the JSON bytes sent in a binary frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a request back from bytes (used by feed simulators)
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
