use std::time::{Duration, Instant};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::game::constants::timeouts;
use crate::game::state::{ConnectionId, PlayerId, TeamId};
use crate::net::limits::LimitCounters;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Socket open, login not completed
    Connecting,
    /// Logged in and active
    Connected,
    /// Close requested by the room
    Disconnecting,
}

/// What the connection is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// A player's socket
    Main,
    /// The sync service
    Sync,
}

/// Silence detection. A player connection that sends nothing for
/// `timeouts::LAGGING_MS` is flagged until its next packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaggingState {
    pub is_active: bool,
    /// When the current or last episode started
    pub last_at: Option<Instant>,
    /// Length of the last finished episode
    pub last_duration: Duration,
    pub detects: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PendingFlags {
    pub login: bool,
    /// Respawn forwarded to the simulation and not yet confirmed
    pub respawn: bool,
}

/// Sync service handshake progress
#[derive(Debug, Clone, Default)]
pub struct SyncHandshake {
    /// Nonce sent in the `auth` message
    pub nonce: String,
    pub auth_complete: bool,
    pub init_complete: bool,
    /// A handshake step was rejected; nothing more is accepted
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Login,
    /// Armed when a ping goes out, cancelled by the pong
    Pong,
    Respawn,
    Lagging,
    /// Periodic; re-armed by the room after it fires
    Ping,
}

impl TimerKind {
    const COUNT: usize = 5;

    pub fn default_duration(&self) -> Duration {
        let ms = match self {
            TimerKind::Login => timeouts::LOGIN_MS,
            TimerKind::Pong => timeouts::PONG_MS,
            TimerKind::Respawn => timeouts::RESPAWN_MS,
            TimerKind::Lagging => timeouts::LAGGING_MS,
            TimerKind::Ping => timeouts::PING_PERIOD_MS,
        };
        Duration::from_millis(ms)
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => TimerKind::Login,
            1 => TimerKind::Pong,
            2 => TimerKind::Respawn,
            3 => TimerKind::Lagging,
            _ => TimerKind::Ping,
        }
    }
}

/// Per-connection deadlines checked against the monotonic clock every tick.
/// Dropping the connection record drops every deadline with it.
#[derive(Debug, Clone, Default)]
pub struct Deadlines {
    slots: [Option<Instant>; TimerKind::COUNT],
}

impl Deadlines {
    pub fn schedule(&mut self, kind: TimerKind, at: Instant) {
        self.slots[kind as usize] = Some(at);
    }

    pub fn schedule_in(&mut self, kind: TimerKind, now: Instant) {
        self.schedule(kind, now + kind.default_duration());
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind as usize] = None;
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; TimerKind::COUNT];
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.slots[kind as usize].is_some()
    }

    /// Clear and return every deadline at or before `now`
    pub fn take_expired(&mut self, now: Instant) -> SmallVec<[TimerKind; 4]> {
        let mut expired = SmallVec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some_and(|at| at <= now) {
                *slot = None;
                expired.push(TimerKind::from_index(index));
            }
        }
        expired
    }
}

/// Session metadata attached to a connection by id
#[derive(Debug)]
pub struct ConnectionMeta {
    pub id: ConnectionId,
    pub role: ConnectionRole,
    pub status: ConnectionStatus,
    pub is_bot: bool,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
    pub user_id: Option<String>,
    pub created_at: Instant,
    pub last_packet_at: Instant,
    pub lagging: LaggingState,
    pub pending: PendingFlags,
    pub limits: LimitCounters,
    pub deadlines: Deadlines,
    pub sync: SyncHandshake,
}

impl ConnectionMeta {
    pub fn new(id: ConnectionId, role: ConnectionRole, now: Instant) -> Self {
        Self {
            id,
            role,
            status: ConnectionStatus::Connecting,
            is_bot: false,
            player_id: None,
            team_id: None,
            user_id: None,
            created_at: now,
            last_packet_at: now,
            lagging: LaggingState::default(),
            pending: PendingFlags::default(),
            limits: LimitCounters::new(),
            deadlines: Deadlines::default(),
            sync: SyncHandshake::default(),
        }
    }

    /// Complete the login of a player connection
    pub fn login(&mut self, player_id: PlayerId, now: Instant) {
        self.player_id = Some(player_id);
        self.status = ConnectionStatus::Connected;
        self.pending.login = false;
        self.deadlines.cancel(TimerKind::Login);
        self.deadlines.schedule_in(TimerKind::Ping, now);
        self.touch(now);
    }

    /// Record an inbound packet. Ends a lagging episode and re-arms the
    /// silence deadline of player connections.
    pub fn touch(&mut self, now: Instant) {
        self.last_packet_at = now;
        if self.lagging.is_active {
            self.lagging.is_active = false;
            if let Some(started) = self.lagging.last_at {
                self.lagging.last_duration = now.saturating_duration_since(started);
            }
        }
        if self.role == ConnectionRole::Main && self.status == ConnectionStatus::Connected {
            self.deadlines.schedule_in(TimerKind::Lagging, now);
        }
    }

    /// Silence deadline fired
    pub fn start_lagging(&mut self, now: Instant) {
        self.lagging.is_active = true;
        self.lagging.last_at = Some(now);
        self.lagging.detects += 1;
    }

    pub fn is_lagging(&self) -> bool {
        self.lagging.is_active
    }

    /// Ping went out: re-arm the period and wait for the pong. An earlier
    /// unanswered ping keeps its deadline.
    pub fn ping_sent(&mut self, now: Instant) {
        self.deadlines.schedule_in(TimerKind::Ping, now);
        if !self.deadlines.is_scheduled(TimerKind::Pong) {
            self.deadlines.schedule_in(TimerKind::Pong, now);
        }
    }

    pub fn pong_received(&mut self, now: Instant) {
        self.deadlines.cancel(TimerKind::Pong);
        self.touch(now);
    }

    /// Returns false while an earlier respawn is still unconfirmed
    pub fn request_respawn(&mut self, now: Instant) -> bool {
        if self.pending.respawn {
            return false;
        }
        self.pending.respawn = true;
        self.deadlines.schedule_in(TimerKind::Respawn, now);
        true
    }

    /// Simulation confirmed the respawn, or gave up on it
    pub fn finish_respawn(&mut self) -> bool {
        self.deadlines.cancel(TimerKind::Respawn);
        std::mem::replace(&mut self.pending.respawn, false)
    }

    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_packet_at)
    }

    pub fn is_sync(&self) -> bool {
        self.role == ConnectionRole::Sync
    }
}

/// Connection records keyed by id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionMeta>,
    player_connections: HashMap<PlayerId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. An existing record with the same id is replaced and
    /// returned.
    pub fn insert(&mut self, meta: ConnectionMeta) -> Option<ConnectionMeta> {
        if let Some(player_id) = meta.player_id {
            self.player_connections.insert(player_id, meta.id);
        }
        self.connections.insert(meta.id, meta)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionMeta> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionMeta> {
        self.connections.get_mut(&id)
    }

    pub fn get_by_player(&self, player_id: PlayerId) -> Option<&ConnectionMeta> {
        self.player_connections
            .get(&player_id)
            .and_then(|id| self.connections.get(id))
    }

    pub fn get_by_player_mut(&mut self, player_id: PlayerId) -> Option<&mut ConnectionMeta> {
        let id = self.player_connections.get(&player_id)?;
        self.connections.get_mut(id)
    }

    pub fn associate_player(&mut self, id: ConnectionId, player_id: PlayerId) {
        self.player_connections.insert(player_id, id);
    }

    /// Remove a record together with its deadlines
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionMeta> {
        let conn = self.connections.remove(&id)?;
        if let Some(player_id) = conn.player_id {
            if self.player_connections.get(&player_id) == Some(&id) {
                self.player_connections.remove(&player_id);
            }
        }
        Some(conn)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn lagging_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_lagging()).count()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConnectionMeta> {
        self.connections.values_mut()
    }

    /// Collect expired deadlines of every connection
    pub fn take_expired(&mut self, now: Instant) -> Vec<(ConnectionId, TimerKind)> {
        let mut expired = Vec::new();
        for conn in self.connections.values_mut() {
            for kind in conn.deadlines.take_expired(now) {
                expired.push((conn.id, kind));
            }
        }
        expired.sort_unstable_by_key(|(id, kind)| (*id, *kind as usize));
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_new() {
        let now = Instant::now();
        let conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        assert_eq!(conn.id, 1);
        assert_eq!(conn.status, ConnectionStatus::Connecting);
        assert!(conn.player_id.is_none());
        assert!(!conn.is_sync());
    }

    #[test]
    fn test_connection_login() {
        let now = Instant::now();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        conn.pending.login = true;
        conn.deadlines.schedule_in(TimerKind::Login, now);

        conn.login(7, now);

        assert_eq!(conn.player_id, Some(7));
        assert_eq!(conn.status, ConnectionStatus::Connected);
        assert!(!conn.pending.login);
        assert!(!conn.deadlines.is_scheduled(TimerKind::Login));
        assert!(conn.deadlines.is_scheduled(TimerKind::Ping));
    }

    #[test]
    fn test_lagging_episode() {
        let now = Instant::now();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        conn.login(7, now);
        assert!(conn.deadlines.is_scheduled(TimerKind::Lagging));

        let silent = now + TimerKind::Lagging.default_duration();
        assert!(conn.deadlines.take_expired(silent).contains(&TimerKind::Lagging));
        conn.start_lagging(silent);
        assert!(conn.is_lagging());
        assert_eq!(conn.lagging.detects, 1);

        let back = silent + Duration::from_millis(400);
        conn.touch(back);
        assert!(!conn.is_lagging());
        assert_eq!(conn.lagging.last_duration, Duration::from_millis(400));
        assert!(conn.deadlines.is_scheduled(TimerKind::Lagging));
    }

    #[test]
    fn test_sync_connection_never_lags() {
        let now = Instant::now();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Sync, now);
        conn.status = ConnectionStatus::Connected;
        conn.touch(now);
        assert!(!conn.deadlines.is_scheduled(TimerKind::Lagging));
    }

    #[test]
    fn test_ping_pong() {
        let now = Instant::now();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        conn.login(7, now);

        conn.ping_sent(now);
        assert!(conn.deadlines.is_scheduled(TimerKind::Pong));

        // A second ping does not push the pong deadline back
        let later = now + Duration::from_secs(1);
        conn.ping_sent(later);
        let expired = conn.deadlines.take_expired(now + TimerKind::Pong.default_duration());
        assert!(expired.contains(&TimerKind::Pong));

        conn.ping_sent(later);
        conn.pong_received(later);
        assert!(!conn.deadlines.is_scheduled(TimerKind::Pong));
        assert_eq!(conn.last_packet_at, later);
    }

    #[test]
    fn test_respawn_pending() {
        let now = Instant::now();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        assert!(conn.request_respawn(now));
        assert!(conn.pending.respawn);
        assert!(conn.deadlines.is_scheduled(TimerKind::Respawn));
        assert!(!conn.request_respawn(now));

        assert!(conn.finish_respawn());
        assert!(!conn.pending.respawn);
        assert!(!conn.deadlines.is_scheduled(TimerKind::Respawn));
        assert!(!conn.finish_respawn());
        assert!(conn.request_respawn(now));
    }

    #[test]
    fn test_deadlines_expire_once() {
        let now = Instant::now();
        let mut deadlines = Deadlines::default();
        deadlines.schedule(TimerKind::Pong, now + Duration::from_millis(10));
        deadlines.schedule(TimerKind::Respawn, now + Duration::from_secs(10));

        assert!(deadlines.take_expired(now).is_empty());

        let expired = deadlines.take_expired(now + Duration::from_millis(10));
        assert_eq!(expired.as_slice(), &[TimerKind::Pong]);
        assert!(deadlines.take_expired(now + Duration::from_millis(10)).is_empty());
        assert!(deadlines.is_scheduled(TimerKind::Respawn));
    }

    #[test]
    fn test_deadlines_cancel_all() {
        let now = Instant::now();
        let mut deadlines = Deadlines::default();
        deadlines.schedule_in(TimerKind::Login, now);
        deadlines.schedule_in(TimerKind::Ping, now);
        deadlines.cancel_all();
        assert!(deadlines.take_expired(now + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_registry_player_association() {
        let now = Instant::now();
        let mut registry = ConnectionRegistry::new();
        let mut conn = ConnectionMeta::new(5, ConnectionRole::Main, now);
        conn.login(9, now);
        registry.insert(conn);

        assert_eq!(registry.get_by_player(9).map(|c| c.id), Some(5));

        registry.remove(5);
        assert!(registry.get_by_player(9).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registry_removal_drops_deadlines() {
        let now = Instant::now();
        let mut registry = ConnectionRegistry::new();
        let mut conn = ConnectionMeta::new(1, ConnectionRole::Main, now);
        conn.deadlines.schedule(TimerKind::Login, now);
        registry.insert(conn);
        registry.remove(1);

        assert!(registry.take_expired(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_registry_take_expired() {
        let now = Instant::now();
        let mut registry = ConnectionRegistry::new();
        for id in [2, 1] {
            let mut conn = ConnectionMeta::new(id, ConnectionRole::Main, now);
            conn.deadlines.schedule(TimerKind::Login, now);
            registry.insert(conn);
        }

        let expired = registry.take_expired(now);
        assert_eq!(expired, vec![(1, TimerKind::Login), (2, TimerKind::Login)]);
    }
}
