use serde::{Deserialize, Serialize};

use crate::game::state::{MobId, MobType, PlayerId, Timestamp};
use crate::util::vec2::Vec2;

/// Messages from the room core to player connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Mob became visible to the receiving connection
    MobEntered {
        id: MobId,
        kind: MobType,
        position: Vec2,
    },
    /// State change of a visible mob
    MobUpdate {
        id: MobId,
        timestamp: Timestamp,
        /// JSON object snapshot
        snapshot: String,
    },
    /// Mob is no longer visible to the receiving connection
    MobLeft { id: MobId },
    /// Connection now also receives `target`'s stream
    SpectateStarted { target: PlayerId },
    /// Connection stopped spectating
    SpectateStopped,
}

/// Mutation of a world object emitted by the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub mob_id: MobId,
    /// Object type name, also used to decide whether the sync service tracks it
    pub object_type: String,
    /// Object identity on the sync wire. Defaults to the mob id.
    pub object_id: String,
    /// JSON object snapshot
    pub snapshot: String,
    /// JSON event payload
    pub event: String,
    pub timestamp: Timestamp,
}

impl MutationEvent {
    pub fn new(
        mob_id: MobId,
        object_type: impl Into<String>,
        snapshot: impl Into<String>,
        event: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            mob_id,
            object_type: object_type.into(),
            object_id: mob_id.to_string(),
            snapshot: snapshot.into(),
            event: event.into(),
            timestamp,
        }
    }

    /// Use a sync object id other than the mob id (e.g. a user account id)
    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = object_id.into();
        self
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with the browser client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
