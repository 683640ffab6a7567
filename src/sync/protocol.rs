//! Sync service wire messages
//!
//! JSON objects tagged by the `c` field. The same enum is used in both
//! directions; each side only expects a subset.

use serde::{Deserialize, Serialize};

use crate::game::state::Timestamp;
use crate::sync::storage::SequenceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "c", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// Room -> service: nonce to sign
    Auth { nonce: String },
    /// Service -> room: base64 HMAC-SHA256 of the nonce
    AuthResponse { signature: String },
    /// Room -> service: identity of this room
    Init {
        #[serde(rename = "serverId")]
        server_id: String,
        endpoint: String,
    },
    /// Service -> room: ready to receive updates
    InitAck,
    /// Room -> service: one replicated object state change
    Update {
        #[serde(rename = "sequence")]
        sequence_id: SequenceId,
        #[serde(rename = "type")]
        object_type: String,
        id: String,
        data: String,
        timestamp: Timestamp,
        event: String,
    },
    /// Service -> room: result for one sequence id, or for the contiguous
    /// range `sequence..=until`
    Ack {
        #[serde(rename = "sequence")]
        sequence_id: SequenceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<SequenceId>,
        result: i32,
    },
    /// Room -> service: push this object's state to the room
    Subscribe {
        #[serde(rename = "type")]
        object_type: String,
        id: String,
    },
    /// Service -> room: state of a subscribed object
    Object {
        #[serde(rename = "type")]
        object_type: String,
        id: String,
        data: String,
    },
}

impl SyncMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
