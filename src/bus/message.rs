//! Wire format of presence and focus messages.
//!
//! `{ v, kind, tabId, timestamp? }`, MessagePack-encoded with named fields
//! so that a peer built from another revision can still read the map.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peer::{PeerId, unix_millis};

/// Current wire version. Messages without a `v` field are treated as v1.
pub const WIRE_VERSION: u8 = 1;

/// What a message announces about its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ping,
    Pong,
    NewTab,
    TabClosed,
    FocusLost,
    FocusGained,
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(default = "default_version")]
    pub v: u8,
    pub kind: MessageKind,
    /// The sending context.
    #[serde(rename = "tabId")]
    pub tab_id: PeerId,
    /// Unix milliseconds, set on `new_tab` and focus messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

fn default_version() -> u8 {
    WIRE_VERSION
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl PeerMessage {
    /// An untimed message (`ping`, `pong`, `tab_closed`).
    pub fn new(kind: MessageKind, tab_id: PeerId) -> Self {
        Self {
            v: WIRE_VERSION,
            kind,
            tab_id,
            timestamp: None,
        }
    }

    /// A message stamped with the current wall-clock time.
    pub fn timed(kind: MessageKind, tab_id: PeerId) -> Self {
        Self {
            timestamp: Some(unix_millis()),
            ..Self::new(kind, tab_id)
        }
    }

    /// MessagePack with named fields.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }

    /// Unknown kinds and malformed payloads are errors.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(rmp_serde::from_slice(payload)?)
    }
}
