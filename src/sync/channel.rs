//! Sync replication channel
//!
//! Ordered, at-least-once delivery of object updates to the sync service.
//!
//! ```text
//! created ──inactive──▶ AwaitingSequenceId ──activate──▶ AwaitingSend
//! created ──active────▶ AwaitingSend ──flush──▶ AwaitingAck ──ok──▶ discarded
//!                                      AwaitingAck ──timeout/transient──▶ AwaitingResend
//!                                      AwaitingResend ──flush──▶ AwaitingAck
//!                                      AwaitingAck ──rejected──▶ Quarantined (alarm)
//! ```
//!
//! Transmission always walks sequence ids in ascending order across the send
//! and resend containers. An update waiting out its resend delay holds back
//! everything behind it, so a newer update never reaches the wire ahead of an
//! older one that still has to go.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::game::constants::sync::{ack, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_RESEND_INTERVAL_MS, MAX_UPDATES_PER_FLUSH};
use crate::game::state::ConnectionId;
use crate::sync::protocol::SyncMessage;
use crate::sync::storage::{object_key, QueueDepths, SequenceId, SyncDataUpdate, SyncStorage, UpdateStage};

/// Delay before a failed update is retransmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendPolicy {
    Fixed { interval: Duration },
    /// `base * 2^(send_count - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl ResendPolicy {
    pub fn retry_delay(&self, send_count: u32) -> Duration {
        match *self {
            ResendPolicy::Fixed { interval } => interval,
            ResendPolicy::Exponential { base, max } => {
                let exponent = send_count.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
            }
        }
    }
}

impl Default for ResendPolicy {
    fn default() -> Self {
        ResendPolicy::Fixed {
            interval: Duration::from_millis(DEFAULT_RESEND_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncChannelConfig {
    /// Time an update may wait for its acknowledgement
    pub ack_timeout: Duration,
    pub resend: ResendPolicy,
    /// Object types replicated to the sync service
    pub tracked_types: HashSet<String>,
    pub max_updates_per_flush: usize,
}

impl Default for SyncChannelConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            resend: ResendPolicy::default(),
            tracked_types: HashSet::new(),
            max_updates_per_flush: MAX_UPDATES_PER_FLUSH,
        }
    }
}

/// Integrity failures reported to the owning process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Sync service rejected update {sequence_id} ({object_type}:{object_id}) with code {code}")]
    Rejected {
        sequence_id: SequenceId,
        code: i32,
        object_type: String,
        object_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Update delivered and discarded
    Acknowledged,
    /// Update scheduled for resend
    Retry,
    /// No in-flight update with this sequence id (duplicate or stale ack)
    Unknown,
}

#[derive(Debug, Default)]
pub struct AckReport {
    pub acknowledged: usize,
    pub retried: usize,
    pub unknown: usize,
    pub alarms: Vec<SyncError>,
}

/// Object state pushed by the sync service for a subscribed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncObject {
    pub object_type: String,
    pub id: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub transmitted: u64,
    pub resends: u64,
    pub acknowledged: u64,
    pub timeouts: u64,
    pub alarms: u64,
}

enum AckClass {
    Positive,
    Transient,
    Fatal,
}

fn classify(code: i32) -> AckClass {
    match code {
        ack::OK => AckClass::Positive,
        ack::REJECTED_MALFORMED | ack::REJECTED_PERMANENT => AckClass::Fatal,
        // Unknown codes are never a reason to drop data
        _ => AckClass::Transient,
    }
}

pub struct SyncChannel {
    storage: SyncStorage,
    config: SyncChannelConfig,
    stats: SyncStats,
}

impl SyncChannel {
    pub fn new(
        config: SyncChannelConfig,
        this_server_id: impl Into<String>,
        this_server_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            storage: SyncStorage::new(this_server_id, this_server_endpoint),
            config,
            stats: SyncStats::default(),
        }
    }

    pub fn is_tracked(&self, object_type: &str) -> bool {
        self.config.tracked_types.contains(object_type)
    }

    pub fn is_active(&self) -> bool {
        self.storage.active
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.storage.connection_id
    }

    /// Queue a new update. Returns its sequence id if the channel is active and
    /// one was assigned right away.
    pub fn enqueue(&mut self, update: SyncDataUpdate) -> Option<SequenceId> {
        if self.storage.active {
            let sequence_id = self.storage.assign_sequence_id();
            self.storage.updates_awaiting_send.insert(sequence_id, update);
            Some(sequence_id)
        } else {
            self.storage.updates_awaiting_sequence_id.push_back(update);
            None
        }
    }

    /// Sync connection finished its handshake. Returns the messages to send:
    /// object subscriptions followed by every update that is ready to go.
    pub fn activate(&mut self, connection_id: ConnectionId, now: Instant) -> Vec<SyncMessage> {
        self.storage.active = true;
        self.storage.connection_id = Some(connection_id);

        // Acks for anything sent over the previous connection will never come
        let unacked = std::mem::take(&mut self.storage.updates_awaiting_ack);
        for (sequence_id, mut update) in unacked {
            update.meta.state_changed_at = now;
            self.storage.updates_awaiting_resend.insert(sequence_id, update);
        }
        for update in self.storage.updates_awaiting_resend.values_mut() {
            update.meta.retry_at = Some(now);
        }

        let backlog = self.storage.updates_awaiting_sequence_id.len();
        while let Some(mut update) = self.storage.updates_awaiting_sequence_id.pop_front() {
            let sequence_id = self.storage.assign_sequence_id();
            update.meta.state_changed_at = now;
            self.storage.updates_awaiting_send.insert(sequence_id, update);
        }

        let depths = self.storage.depths();
        info!(
            "Sync channel active on connection {} ({} newly sequenced, {} to send, {} to resend)",
            connection_id, backlog, depths.awaiting_send, depths.awaiting_resend
        );

        let mut messages: Vec<SyncMessage> = self
            .storage
            .subscribed_objects
            .iter()
            .filter_map(|key| key.split_once(':'))
            .map(|(object_type, id)| SyncMessage::Subscribe {
                object_type: object_type.to_string(),
                id: id.to_string(),
            })
            .collect();
        messages.extend(self.flush(now));
        messages
    }

    /// Sync connection went away. Nothing is discarded; every update stays in
    /// its container. Returns true if the channel was active.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.storage.active;
        if was_active {
            let depths = self.storage.depths();
            warn!(
                "Sync channel inactive ({} awaiting ack, {} awaiting resend, {} awaiting send)",
                depths.awaiting_ack, depths.awaiting_resend, depths.awaiting_send
            );
        }
        self.storage.active = false;
        self.storage.connection_id = None;
        was_active
    }

    /// Per-tick processing: expire overdue acknowledgements, then transmit
    pub fn tick(&mut self, now: Instant) -> Vec<SyncMessage> {
        self.expire(now);
        self.flush(now)
    }

    /// Move updates whose acknowledgement deadline passed to the resend
    /// container. Returns how many moved.
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.config.ack_timeout;
        let overdue: Vec<SequenceId> = self
            .storage
            .updates_awaiting_ack
            .iter()
            .filter(|(_, u)| now.saturating_duration_since(u.meta.state_changed_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for sequence_id in &overdue {
            debug!("Sync update {} ack timed out", sequence_id);
            self.schedule_resend(*sequence_id, ack::LOCAL_TIMEOUT, now);
        }
        self.stats.timeouts += overdue.len() as u64;
        overdue.len()
    }

    /// Transmit ready updates in ascending sequence order
    pub fn flush(&mut self, now: Instant) -> Vec<SyncMessage> {
        let mut messages = Vec::new();
        if !self.storage.active {
            return messages;
        }

        while messages.len() < self.config.max_updates_per_flush {
            let next_send = self.storage.updates_awaiting_send.keys().next().copied();
            let next_resend = self
                .storage
                .updates_awaiting_resend
                .iter()
                .next()
                .map(|(id, u)| (*id, u.meta.retry_at));

            let (sequence_id, is_resend) = match (next_send, next_resend) {
                (None, None) => break,
                (Some(s), None) => (s, false),
                (None, Some((r, _))) => (r, true),
                (Some(s), Some((r, _))) => {
                    if r < s {
                        (r, true)
                    } else {
                        (s, false)
                    }
                }
            };

            if is_resend {
                let retry_at = next_resend.and_then(|(_, at)| at);
                if retry_at.is_some_and(|at| at > now) {
                    // Head of line waits out its delay; nothing newer overtakes it
                    break;
                }
            }

            let source = if is_resend {
                &mut self.storage.updates_awaiting_resend
            } else {
                &mut self.storage.updates_awaiting_send
            };
            let Some(mut update) = source.remove(&sequence_id) else {
                break;
            };

            update.meta.send_count += 1;
            update.meta.state_changed_at = now;
            update.meta.retry_at = None;

            messages.push(SyncMessage::Update {
                sequence_id,
                object_type: update.object_type.clone(),
                id: update.id.clone(),
                data: update.data.clone(),
                timestamp: update.timestamp,
                event: update.event.clone(),
            });

            self.stats.transmitted += 1;
            if is_resend {
                self.stats.resends += 1;
            }
            self.storage.updates_awaiting_ack.insert(sequence_id, update);
        }

        messages
    }

    /// Apply an acknowledgement for one sequence id
    pub fn apply_ack(&mut self, sequence_id: SequenceId, code: i32, now: Instant) -> Result<AckOutcome, SyncError> {
        match classify(code) {
            AckClass::Positive => {
                // A late ack for an update that already timed out still proves delivery
                let removed = self
                    .storage
                    .updates_awaiting_ack
                    .remove(&sequence_id)
                    .or_else(|| self.storage.updates_awaiting_resend.remove(&sequence_id));
                match removed {
                    Some(_) => {
                        self.stats.acknowledged += 1;
                        Ok(AckOutcome::Acknowledged)
                    }
                    None => {
                        debug!("Ack for unknown sync update {}", sequence_id);
                        Ok(AckOutcome::Unknown)
                    }
                }
            }
            AckClass::Transient => {
                if self.storage.updates_awaiting_ack.contains_key(&sequence_id) {
                    debug!("Sync update {} transient failure (code {})", sequence_id, code);
                    self.schedule_resend(sequence_id, code, now);
                    Ok(AckOutcome::Retry)
                } else {
                    Ok(AckOutcome::Unknown)
                }
            }
            AckClass::Fatal => {
                let removed = self
                    .storage
                    .updates_awaiting_ack
                    .remove(&sequence_id)
                    .or_else(|| self.storage.updates_awaiting_resend.remove(&sequence_id));
                let Some(mut update) = removed else {
                    return Ok(AckOutcome::Unknown);
                };

                update.meta.last_ack_result = code;
                update.meta.state_changed_at = now;
                update.meta.retry_at = None;
                let err = SyncError::Rejected {
                    sequence_id,
                    code,
                    object_type: update.object_type.clone(),
                    object_id: update.id.clone(),
                };
                error!("{}; update quarantined", err);
                self.storage.quarantined.insert(sequence_id, update);
                self.stats.alarms += 1;
                Err(err)
            }
        }
    }

    /// Apply one result code to every in-flight update in `first..=last`
    pub fn apply_ack_range(
        &mut self,
        first: SequenceId,
        last: SequenceId,
        code: i32,
        now: Instant,
    ) -> AckReport {
        let mut report = AckReport::default();
        if last < first {
            report.unknown += 1;
            return report;
        }

        let mut targets: Vec<SequenceId> = self
            .storage
            .updates_awaiting_ack
            .range(first..=last)
            .map(|(id, _)| *id)
            .chain(self.storage.updates_awaiting_resend.range(first..=last).map(|(id, _)| *id))
            .collect();
        targets.sort_unstable();

        if targets.is_empty() {
            report.unknown += 1;
        }
        for sequence_id in targets {
            match self.apply_ack(sequence_id, code, now) {
                Ok(AckOutcome::Acknowledged) => report.acknowledged += 1,
                Ok(AckOutcome::Retry) => report.retried += 1,
                Ok(AckOutcome::Unknown) => report.unknown += 1,
                Err(alarm) => report.alarms.push(alarm),
            }
        }
        report
    }

    fn schedule_resend(&mut self, sequence_id: SequenceId, code: i32, now: Instant) {
        if let Some(mut update) = self.storage.updates_awaiting_ack.remove(&sequence_id) {
            update.meta.last_ack_result = code;
            update.meta.state_changed_at = now;
            update.meta.retry_at = Some(now + self.config.resend.retry_delay(update.meta.send_count));
            self.storage.updates_awaiting_resend.insert(sequence_id, update);
        }
    }

    /// Ask the service to push an object's state. Returns the message to send
    /// if the channel is active and the subscription is new.
    pub fn subscribe_object(&mut self, object_type: &str, id: &str) -> Option<SyncMessage> {
        let inserted = self.storage.subscribed_objects.insert(object_key(object_type, id));
        if inserted && self.storage.active {
            Some(SyncMessage::Subscribe {
                object_type: object_type.to_string(),
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    /// Accept pushed object state if the room subscribed to it
    pub fn receive_object(&self, object_type: &str, id: &str, data: &str) -> Option<SyncObject> {
        if !self.storage.is_subscribed(object_type, id) {
            debug!("Ignored unsubscribed sync object {}:{}", object_type, id);
            return None;
        }
        Some(SyncObject {
            object_type: object_type.to_string(),
            id: id.to_string(),
            data: data.to_string(),
        })
    }

    pub fn quarantined(&self) -> &BTreeMap<SequenceId, SyncDataUpdate> {
        &self.storage.quarantined
    }

    /// Operator action: put a quarantined update back into the retry cycle
    pub fn requeue_quarantined(&mut self, sequence_id: SequenceId, now: Instant) -> bool {
        match self.storage.quarantined.remove(&sequence_id) {
            Some(mut update) => {
                update.meta.state_changed_at = now;
                update.meta.retry_at = Some(now);
                self.storage.updates_awaiting_resend.insert(sequence_id, update);
                true
            }
            None => false,
        }
    }

    pub fn stage_of(&self, sequence_id: SequenceId) -> Option<UpdateStage> {
        self.storage.stage_of(sequence_id)
    }

    pub fn depths(&self) -> QueueDepths {
        self.storage.depths()
    }

    pub fn storage(&self) -> &SyncStorage {
        &self.storage
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn config(&self) -> &SyncChannelConfig {
        &self.config
    }
}
