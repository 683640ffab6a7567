//! Broadcast routing
//!
//! Keeps the inverse of the viewport sets: for every mob, the connections that
//! must receive its updates. The index is a cache derived from viewport deltas
//! and subscription changes; viewports stay the source of truth.
//!
//! A connection can be interested in the same mob for more than one reason
//! (its own viewport and a spectated player's viewport), so each
//! (mob, connection) pair carries a reference count. The connection leaves the
//! interest set only when the last reason goes away.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::game::state::{ConnectionId, MobId, PlayerId};
use crate::net::viewport::{ViewportDelta, ViewportError, ViewportManager};

/// Serialized message shared across every recipient
pub type Payload = Arc<[u8]>;

/// Outbound queue of the socket transport
pub trait Outbound {
    /// Queue `payload` for `connection_id`. Returns false if the connection
    /// has no live queue.
    fn send(&mut self, connection_id: ConnectionId, payload: Payload) -> bool;
}

/// Connections that started or stopped being interested in a mob
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterestChanges {
    pub gained: Vec<(ConnectionId, MobId)>,
    pub lost: Vec<(ConnectionId, MobId)>,
}

impl InterestChanges {
    pub fn is_empty(&self) -> bool {
        self.gained.is_empty() && self.lost.is_empty()
    }

    fn merge(&mut self, other: InterestChanges) {
        self.gained.extend(other.gained);
        self.lost.extend(other.lost);
    }
}

#[derive(Default)]
pub struct BroadcastRouter {
    /// mob -> (connection -> reference count)
    interest: HashMap<MobId, HashMap<ConnectionId, u32>>,
    /// connection -> mobs it is interested in
    by_connection: HashMap<ConnectionId, HashSet<MobId>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the connection was not interested in the mob before
    pub fn add_interest(&mut self, connection_id: ConnectionId, mob_id: MobId) -> bool {
        let count = self
            .interest
            .entry(mob_id)
            .or_default()
            .entry(connection_id)
            .or_insert(0);
        *count += 1;
        if *count == 1 {
            self.by_connection.entry(connection_id).or_default().insert(mob_id);
            true
        } else {
            false
        }
    }

    /// Returns true if the connection is no longer interested in the mob
    pub fn remove_interest(&mut self, connection_id: ConnectionId, mob_id: MobId) -> bool {
        let Some(connections) = self.interest.get_mut(&mob_id) else {
            return false;
        };
        let Some(count) = connections.get_mut(&connection_id) else {
            return false;
        };

        *count -= 1;
        if *count > 0 {
            return false;
        }

        connections.remove(&connection_id);
        if connections.is_empty() {
            self.interest.remove(&mob_id);
        }
        if let Some(mobs) = self.by_connection.get_mut(&connection_id) {
            mobs.remove(&mob_id);
            if mobs.is_empty() {
                self.by_connection.remove(&connection_id);
            }
        }
        true
    }

    /// Apply one player's recompute result to the player's connection and to
    /// every connection subscribed to the player
    pub fn apply_viewport_delta(
        &mut self,
        viewports: &ViewportManager,
        player_id: PlayerId,
        delta: &ViewportDelta,
    ) -> Result<InterestChanges, ViewportError> {
        let connections = viewports
            .stream_connections(player_id)
            .ok_or(ViewportError::NotFound(player_id))?;

        let mut changes = InterestChanges::default();
        for &mob_id in &delta.entered {
            for &connection_id in &connections {
                if self.add_interest(connection_id, mob_id) {
                    changes.gained.push((connection_id, mob_id));
                }
            }
        }
        for &mob_id in &delta.leaved {
            for &connection_id in &connections {
                if self.remove_interest(connection_id, mob_id) {
                    changes.lost.push((connection_id, mob_id));
                }
            }
        }
        Ok(changes)
    }

    /// A connection starts following another viewport's current set
    pub fn attach<'a>(
        &mut self,
        connection_id: ConnectionId,
        mobs: impl IntoIterator<Item = &'a MobId>,
    ) -> InterestChanges {
        let mut changes = InterestChanges::default();
        for &mob_id in mobs {
            if self.add_interest(connection_id, mob_id) {
                changes.gained.push((connection_id, mob_id));
            }
        }
        changes
    }

    /// Reverse of [`attach`](Self::attach)
    pub fn detach<'a>(
        &mut self,
        connection_id: ConnectionId,
        mobs: impl IntoIterator<Item = &'a MobId>,
    ) -> InterestChanges {
        let mut changes = InterestChanges::default();
        for &mob_id in mobs {
            if self.remove_interest(connection_id, mob_id) {
                changes.lost.push((connection_id, mob_id));
            }
        }
        changes
    }

    /// Move a subscriber's connection from one target's current set to
    /// another's
    pub fn retarget<'a>(
        &mut self,
        connection_id: ConnectionId,
        from: impl IntoIterator<Item = &'a MobId>,
        to: impl IntoIterator<Item = &'a MobId>,
    ) -> InterestChanges {
        // Attach first so mobs visible from both targets never flicker out
        let mut changes = self.attach(connection_id, to);
        changes.merge(self.detach(connection_id, from));
        changes
    }

    /// Hand `payload` to every connection interested in `mob_id`. A mob with
    /// no observers is normal; returns the number of queues reached.
    pub fn route(&self, mob_id: MobId, payload: &Payload, outbound: &mut impl Outbound) -> usize {
        let Some(connections) = self.interest.get(&mob_id) else {
            return 0;
        };
        let mut delivered = 0;
        for &connection_id in connections.keys() {
            if outbound.send(connection_id, payload.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Forget a connection everywhere. Cost is proportional to the number of
    /// mobs the connection was interested in. Returns that number.
    pub fn drop_connection(&mut self, connection_id: ConnectionId) -> usize {
        let Some(mobs) = self.by_connection.remove(&connection_id) else {
            return 0;
        };
        for mob_id in &mobs {
            if let Some(connections) = self.interest.get_mut(mob_id) {
                connections.remove(&connection_id);
                if connections.is_empty() {
                    self.interest.remove(mob_id);
                }
            }
        }
        mobs.len()
    }

    /// Interested connections for a mob, sorted
    pub fn interested(&self, mob_id: MobId) -> SmallVec<[ConnectionId; 8]> {
        let mut out: SmallVec<[ConnectionId; 8]> = self
            .interest
            .get(&mob_id)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn is_interested(&self, connection_id: ConnectionId, mob_id: MobId) -> bool {
        self.interest
            .get(&mob_id)
            .is_some_and(|c| c.contains_key(&connection_id))
    }

    pub fn mobs_of(&self, connection_id: ConnectionId) -> Option<&HashSet<MobId>> {
        self.by_connection.get(&connection_id)
    }

    pub fn mob_count(&self) -> usize {
        self.interest.len()
    }

    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Total (mob, connection) pairs
    pub fn pair_count(&self) -> usize {
        self.by_connection.values().map(|m| m.len()).sum()
    }
}

/// Outbound sink that records every payload, for tests and benchmarks
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    pub sent: Vec<(ConnectionId, Payload)>,
}

impl Outbound for RecordingOutbound {
    fn send(&mut self, connection_id: ConnectionId, payload: Payload) -> bool {
        self.sent.push((connection_id, payload));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spatial::SpatialIndex;
    use crate::util::vec2::Vec2;

    fn payload(bytes: &[u8]) -> Payload {
        Arc::from(bytes)
    }

    fn delta(entered: &[MobId], leaved: &[MobId]) -> ViewportDelta {
        ViewportDelta {
            entered: entered.to_vec(),
            leaved: leaved.to_vec(),
        }
    }

    fn recipients(outbound: &RecordingOutbound) -> Vec<ConnectionId> {
        let mut out: Vec<_> = outbound.sent.iter().map(|(c, _)| *c).collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_apply_delta_and_route() {
        let mut viewports = ViewportManager::default();
        viewports.create_viewport(1, 100, Vec2::ZERO).unwrap();
        viewports.create_viewport(2, 200, Vec2::ZERO).unwrap();

        let mut router = BroadcastRouter::new();
        router.apply_viewport_delta(&viewports, 1, &delta(&[10, 11], &[])).unwrap();
        router.apply_viewport_delta(&viewports, 2, &delta(&[11], &[])).unwrap();

        let mut outbound = RecordingOutbound::default();
        assert_eq!(router.route(11, &payload(b"x"), &mut outbound), 2);
        assert_eq!(recipients(&outbound), vec![100, 200]);

        let mut outbound = RecordingOutbound::default();
        assert_eq!(router.route(10, &payload(b"y"), &mut outbound), 1);
        assert_eq!(recipients(&outbound), vec![100]);
    }

    #[test]
    fn test_route_without_observers_is_noop() {
        let router = BroadcastRouter::new();
        let mut outbound = RecordingOutbound::default();
        assert_eq!(router.route(42, &payload(b"z"), &mut outbound), 0);
        assert!(outbound.sent.is_empty());
    }

    #[test]
    fn test_entered_for_one_leaved_for_other() {
        let mut viewports = ViewportManager::default();
        viewports.create_viewport(1, 100, Vec2::ZERO).unwrap();
        viewports.create_viewport(2, 200, Vec2::ZERO).unwrap();

        let mut router = BroadcastRouter::new();
        router.apply_viewport_delta(&viewports, 2, &delta(&[10], &[])).unwrap();

        router.apply_viewport_delta(&viewports, 1, &delta(&[10], &[])).unwrap();
        let changes = router.apply_viewport_delta(&viewports, 2, &delta(&[], &[10])).unwrap();
        assert_eq!(changes.lost, vec![(200, 10)]);
        assert_eq!(router.interested(10).to_vec(), vec![100]);
    }

    #[test]
    fn test_subscriber_receives_target_stream() {
        let mut viewports = ViewportManager::default();
        viewports.create_viewport(1, 100, Vec2::ZERO).unwrap();
        viewports.create_viewport(2, 200, Vec2::ZERO).unwrap();
        viewports.subscribe(2, 1).unwrap();

        let mut router = BroadcastRouter::new();
        let changes = router.apply_viewport_delta(&viewports, 1, &delta(&[10], &[])).unwrap();
        assert_eq!(changes.gained.len(), 2);
        assert_eq!(router.interested(10).to_vec(), vec![100, 200]);
    }

    #[test]
    fn test_refcount_keeps_shared_interest() {
        let mut router = BroadcastRouter::new();
        // Own viewport and spectated viewport both contain mob 10
        assert!(router.add_interest(200, 10));
        assert!(!router.add_interest(200, 10));

        assert!(!router.remove_interest(200, 10));
        assert!(router.is_interested(200, 10));
        assert!(router.remove_interest(200, 10));
        assert!(!router.is_interested(200, 10));
        assert_eq!(router.mob_count(), 0);
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn test_retarget_keeps_common_mobs() {
        let mut router = BroadcastRouter::new();
        let old_target = [10, 11];
        let new_target = [11, 12];
        router.attach(300, old_target.iter());

        let changes = router.retarget(300, old_target.iter(), new_target.iter());
        assert_eq!(changes.gained, vec![(300, 12)]);
        assert_eq!(changes.lost, vec![(300, 10)]);
        assert!(router.is_interested(300, 11));
    }

    #[test]
    fn test_drop_connection_scenario() {
        let mut viewports = ViewportManager::default();
        viewports.create_viewport(1, 100, Vec2::ZERO).unwrap();
        viewports.create_viewport(2, 200, Vec2::ZERO).unwrap();

        let mut index = SpatialIndex::default();
        index.upsert(10, Vec2::new(5.0, 5.0));
        index.upsert(12, Vec2::new(-5.0, 5.0));

        let mut router = BroadcastRouter::new();
        for player in [1, 2] {
            let d = viewports.recompute(player, &index).unwrap();
            router.apply_viewport_delta(&viewports, player, &d).unwrap();
        }
        assert!(viewports.get(1).unwrap().current.contains(&10));
        assert!(viewports.get(1).unwrap().current.contains(&12));

        assert_eq!(router.drop_connection(100), 2);
        viewports.destroy_viewport(1);

        assert!(!router.is_interested(100, 10));
        assert!(!router.is_interested(100, 12));
        assert_eq!(router.interested(10).to_vec(), vec![200]);
        assert!(viewports.get(1).is_none());
        assert_eq!(router.drop_connection(100), 0);
    }

    #[test]
    fn test_delta_for_missing_viewport() {
        let viewports = ViewportManager::default();
        let mut router = BroadcastRouter::new();
        assert_eq!(
            router.apply_viewport_delta(&viewports, 5, &delta(&[1], &[])),
            Err(ViewportError::NotFound(5))
        );
    }

    #[test]
    fn test_pair_count() {
        let mut router = BroadcastRouter::new();
        router.attach(1, [1, 2, 3].iter());
        router.attach(2, [3].iter());
        assert_eq!(router.pair_count(), 4);
        assert_eq!(router.mobs_of(1).map(|m| m.len()), Some(3));
    }
}
