//! Replication state shared by the whole room
//!
//! Every update lives in exactly one container at a time. Containers keyed by
//! sequence id are ordered maps so that iteration order is sequence order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;

use crate::game::constants::sync::ack;
use crate::game::state::{ConnectionId, Timestamp};

pub type SequenceId = u64;

/// First sequence id handed out by a fresh process
pub const FIRST_SEQUENCE_ID: SequenceId = 1;

/// Metadata for timeouts and resends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncUpdateMetadata {
    /// Last time the update changed container
    pub state_changed_at: Instant,
    /// Last result code received from the sync service, or a local marker
    pub last_ack_result: i32,
    /// Number of transmissions so far
    pub send_count: u32,
    /// Earliest retransmission time while awaiting resend
    pub retry_at: Option<Instant>,
}

/// One replicated object state change
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDataUpdate {
    pub meta: SyncUpdateMetadata,
    pub object_type: String,
    pub id: String,
    /// Object data (JSON)
    pub data: String,
    /// Time of update event
    pub timestamp: Timestamp,
    /// Event data (JSON)
    pub event: String,
}

impl SyncDataUpdate {
    pub fn new(
        object_type: impl Into<String>,
        id: impl Into<String>,
        data: impl Into<String>,
        timestamp: Timestamp,
        event: impl Into<String>,
        now: Instant,
    ) -> Self {
        Self {
            meta: SyncUpdateMetadata {
                state_changed_at: now,
                last_ack_result: ack::LOCAL_NONE,
                send_count: 0,
                retry_at: None,
            },
            object_type: object_type.into(),
            id: id.into(),
            data: data.into(),
            timestamp,
            event: event.into(),
        }
    }

    /// `"type:id"` key used for object subscriptions
    pub fn object_key(&self) -> String {
        object_key(&self.object_type, &self.id)
    }
}

pub fn object_key(object_type: &str, id: &str) -> String {
    format!("{}:{}", object_type, id)
}

/// Container an update currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    AwaitingSequenceId,
    AwaitingSend,
    AwaitingAck,
    AwaitingResend,
    /// Rejected by the peer, out of the retry cycle until an operator requeues it
    Quarantined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub awaiting_sequence_id: usize,
    pub awaiting_send: usize,
    pub awaiting_ack: usize,
    pub awaiting_resend: usize,
    pub quarantined: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.awaiting_sequence_id
            + self.awaiting_send
            + self.awaiting_ack
            + self.awaiting_resend
            + self.quarantined
    }
}

#[derive(Debug)]
pub struct SyncStorage {
    /// Only true while a sync connection exists and has completed its handshake
    pub(crate) active: bool,
    pub(crate) connection_id: Option<ConnectionId>,
    /// Never reset while the process lives
    pub(crate) next_sequence_id: SequenceId,
    /// Room identity (region-room)
    pub this_server_id: String,
    /// Public websocket endpoint of this room
    pub this_server_endpoint: String,
    pub(crate) updates_awaiting_sequence_id: VecDeque<SyncDataUpdate>,
    pub(crate) updates_awaiting_send: BTreeMap<SequenceId, SyncDataUpdate>,
    pub(crate) updates_awaiting_ack: BTreeMap<SequenceId, SyncDataUpdate>,
    pub(crate) updates_awaiting_resend: BTreeMap<SequenceId, SyncDataUpdate>,
    pub(crate) quarantined: BTreeMap<SequenceId, SyncDataUpdate>,
    /// `"type:id"` keys the room asked the service to push
    pub(crate) subscribed_objects: BTreeSet<String>,
}

impl SyncStorage {
    pub fn new(this_server_id: impl Into<String>, this_server_endpoint: impl Into<String>) -> Self {
        Self {
            active: false,
            connection_id: None,
            next_sequence_id: FIRST_SEQUENCE_ID,
            this_server_id: this_server_id.into(),
            this_server_endpoint: this_server_endpoint.into(),
            updates_awaiting_sequence_id: VecDeque::new(),
            updates_awaiting_send: BTreeMap::new(),
            updates_awaiting_ack: BTreeMap::new(),
            updates_awaiting_resend: BTreeMap::new(),
            quarantined: BTreeMap::new(),
            subscribed_objects: BTreeSet::new(),
        }
    }

    pub(crate) fn assign_sequence_id(&mut self) -> SequenceId {
        let id = self.next_sequence_id;
        self.next_sequence_id += 1;
        id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn next_sequence_id(&self) -> SequenceId {
        self.next_sequence_id
    }

    pub fn stage_of(&self, sequence_id: SequenceId) -> Option<UpdateStage> {
        if self.updates_awaiting_send.contains_key(&sequence_id) {
            Some(UpdateStage::AwaitingSend)
        } else if self.updates_awaiting_ack.contains_key(&sequence_id) {
            Some(UpdateStage::AwaitingAck)
        } else if self.updates_awaiting_resend.contains_key(&sequence_id) {
            Some(UpdateStage::AwaitingResend)
        } else if self.quarantined.contains_key(&sequence_id) {
            Some(UpdateStage::Quarantined)
        } else {
            None
        }
    }

    /// Look up a sequenced update in whichever container holds it
    pub fn get(&self, sequence_id: SequenceId) -> Option<&SyncDataUpdate> {
        self.updates_awaiting_send
            .get(&sequence_id)
            .or_else(|| self.updates_awaiting_ack.get(&sequence_id))
            .or_else(|| self.updates_awaiting_resend.get(&sequence_id))
            .or_else(|| self.quarantined.get(&sequence_id))
    }

    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            awaiting_sequence_id: self.updates_awaiting_sequence_id.len(),
            awaiting_send: self.updates_awaiting_send.len(),
            awaiting_ack: self.updates_awaiting_ack.len(),
            awaiting_resend: self.updates_awaiting_resend.len(),
            quarantined: self.quarantined.len(),
        }
    }

    /// Sequence ids currently held in any sequenced container, ascending
    pub fn sequenced_ids(&self) -> Vec<SequenceId> {
        let mut ids: Vec<SequenceId> = self
            .updates_awaiting_send
            .keys()
            .chain(self.updates_awaiting_ack.keys())
            .chain(self.updates_awaiting_resend.keys())
            .chain(self.quarantined.keys())
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_subscribed(&self, object_type: &str, id: &str) -> bool {
        self.subscribed_objects.contains(&object_key(object_type, id))
    }
}
