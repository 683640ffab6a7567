//! Game session - applies network events, recomputes viewports, routes mob
//! updates and drives the sync channel once per tick

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::tick;
use crate::game::spatial::{MobSet, SpatialIndex};
use crate::game::state::{ConnectionId, Mob, MobId, MobType, PlayerId, World};
use crate::game::ticker::{TickInfo, Ticker};
use crate::metrics::Metrics;
use crate::net::broadcast::{BroadcastRouter, InterestChanges, Outbound, Payload};
use crate::net::commands::{CommandAction, ResolvedCommand};
use crate::net::connection::{ConnectionMeta, ConnectionRegistry, ConnectionRole, ConnectionStatus, TimerKind};
use crate::net::limits::LimitCategory;
use crate::net::outbox::{OutboxRegistry, OutboxSender};
use crate::net::protocol::{encode, MutationEvent, ServerMessage};
use crate::net::viewport::{ViewportError, ViewportManager};
use crate::sync::channel::{SyncChannel, SyncError, SyncObject};
use crate::sync::handshake::{self, HandshakeError};
use crate::sync::protocol::SyncMessage;
use crate::sync::storage::{SequenceId, SyncDataUpdate};
use crate::util::vec2::Vec2;

/// Inbound event from the socket transport, applied at the next tick
#[derive(Debug)]
pub enum SessionEvent {
    /// Logged-in player connection with its outbound queue
    PlayerConnected {
        connection_id: ConnectionId,
        player_id: PlayerId,
        horizon: Vec2,
        sender: OutboxSender,
    },
    Horizon {
        player_id: PlayerId,
        x: f32,
        y: f32,
    },
    Resize {
        player_id: PlayerId,
        half_width: f32,
        half_height: f32,
    },
    Command {
        connection_id: ConnectionId,
        command: ResolvedCommand,
    },
    /// Sync service connection opened; the room starts the handshake
    SyncConnected {
        connection_id: ConnectionId,
        sender: OutboxSender,
    },
    SyncMessage {
        connection_id: ConnectionId,
        message: SyncMessage,
    },
    /// Reply to a ping the transport sent after a `TimerKind::Ping` expiry
    Pong { connection_id: ConnectionId },
    /// The simulation finished a forwarded respawn
    Respawned { player_id: PlayerId },
    /// Any connection closed
    Disconnected { connection_id: ConnectionId },
}

/// Command forwarded to the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameAction {
    pub connection_id: ConnectionId,
    pub player_id: PlayerId,
    pub action: CommandAction,
    pub data: String,
}

/// Everything a tick produced for the owning process
#[derive(Debug, Default)]
pub struct TickReport {
    pub frame: u64,
    pub actions: Vec<GameAction>,
    /// Object state pushed by the sync service
    pub sync_objects: Vec<SyncObject>,
    /// Updates the sync service rejected
    pub alarms: Vec<SyncError>,
    pub expired_timers: Vec<(ConnectionId, TimerKind)>,
    /// Connections the transport should close
    pub kick: Vec<ConnectionId>,
}

/// Gameplay behind the room core. Owns how mobs move and what they do.
pub trait Simulation {
    /// Advance the world one frame and report object mutations
    fn step(
        &mut self,
        info: &TickInfo,
        actions: &[GameAction],
        world: &mut World,
        mutations: &mut Vec<MutationEvent>,
    );

    fn on_report(&mut self, _report: &TickReport) {}
}

/// Simulation that leaves the world untouched
#[derive(Debug, Default)]
pub struct IdleSimulation;

impl Simulation for IdleSimulation {
    fn step(&mut self, _: &TickInfo, _: &[GameAction], _: &mut World, _: &mut Vec<MutationEvent>) {}
}

/// API misuse: fatal while developing, logged and skipped in production
fn misuse(err: ViewportError) {
    #[cfg(feature = "strict")]
    panic!("Viewport misuse: {}", err);
    #[cfg(not(feature = "strict"))]
    error!("Viewport misuse ignored: {}", err);
}

pub struct GameSession {
    world: World,
    index: SpatialIndex,
    viewports: ViewportManager,
    router: BroadcastRouter,
    connections: ConnectionRegistry,
    outbox: OutboxRegistry,
    sync: SyncChannel,
    sync_secret: Vec<u8>,
    ticker: Ticker,
    events: Receiver<SessionEvent>,
    metrics: Arc<Metrics>,
    report: TickReport,
}

impl GameSession {
    /// Create a session and the sender the transport uses to feed it
    pub fn new(config: &ServerConfig, metrics: Arc<Metrics>, now: Instant) -> (Self, Sender<SessionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let session = Self {
            world: World::new(),
            index: SpatialIndex::default(),
            viewports: ViewportManager::new(config.viewport_half_extents()),
            router: BroadcastRouter::new(),
            connections: ConnectionRegistry::new(),
            outbox: OutboxRegistry::new(metrics.clone()),
            sync: SyncChannel::new(
                config.sync_channel_config(),
                config.server_id.clone(),
                config.server_endpoint.clone(),
            ),
            sync_secret: config.sync_secret.as_bytes().to_vec(),
            ticker: Ticker::new(config.tick_rate, now),
            events: rx,
            metrics,
            report: TickReport::default(),
        };
        (session, tx)
    }

    /// Run one frame
    pub fn tick(&mut self, now: Instant, simulation: &mut dyn Simulation) -> TickReport {
        let started = Instant::now();
        let info = self.ticker.advance(now);
        self.report.frame = info.frame;

        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event, now);
        }

        let mut mutations = Vec::new();
        simulation.step(&info, &self.report.actions, &mut self.world, &mut mutations);

        self.index.rebuild(self.world.iter());
        self.recompute_viewports();

        for mutation in mutations {
            self.apply_mutation(mutation, now);
        }

        self.process_connections(&info, now);

        let messages = self.sync.tick(now);
        self.send_sync(messages);

        self.update_metrics(&info, started.elapsed());
        std::mem::take(&mut self.report)
    }

    fn apply_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::PlayerConnected {
                connection_id,
                player_id,
                horizon,
                sender,
            } => self.connect_player(connection_id, player_id, horizon, sender, now),
            SessionEvent::Horizon { player_id, x, y } => {
                self.touch_player(player_id, now);
                if let Err(e) = self.viewports.update_horizon(player_id, x, y) {
                    debug!("Stale horizon update: {}", e);
                }
            }
            SessionEvent::Resize {
                player_id,
                half_width,
                half_height,
            } => {
                self.touch_player(player_id, now);
                if let Err(e) = self.viewports.resize(player_id, half_width, half_height) {
                    debug!("Stale resize: {}", e);
                }
            }
            SessionEvent::Command { connection_id, command } => self.apply_command(connection_id, command, now),
            SessionEvent::SyncConnected { connection_id, sender } => {
                self.connect_sync(connection_id, sender, now)
            }
            SessionEvent::SyncMessage { connection_id, message } => {
                self.apply_sync_message(connection_id, message, now)
            }
            SessionEvent::Pong { connection_id } => {
                if let Some(conn) = self.connections.get_mut(connection_id) {
                    conn.pong_received(now);
                }
            }
            SessionEvent::Respawned { player_id } => {
                let confirmed = self
                    .connections
                    .get_by_player_mut(player_id)
                    .is_some_and(|conn| conn.finish_respawn());
                if !confirmed {
                    debug!("Respawn of player {} was not pending", player_id);
                }
            }
            SessionEvent::Disconnected { connection_id } => self.disconnect(connection_id),
        }
    }

    fn touch_player(&mut self, player_id: PlayerId, now: Instant) {
        if let Some(conn) = self.connections.get_by_player_mut(player_id) {
            conn.touch(now);
        }
    }

    fn connect_player(
        &mut self,
        connection_id: ConnectionId,
        player_id: PlayerId,
        horizon: Vec2,
        sender: OutboxSender,
        now: Instant,
    ) {
        if let Err(e) = self.viewports.create_viewport(player_id, connection_id, horizon) {
            misuse(e);
            return;
        }

        let mut meta = ConnectionMeta::new(connection_id, ConnectionRole::Main, now);
        meta.login(player_id, now);
        self.connections.insert(meta);
        self.outbox.register(connection_id, sender);
        if !self.world.contains(player_id) {
            self.world.spawn(Mob::new(player_id, MobType::Player, horizon));
        }

        info!("Player {} joined on connection {}", player_id, connection_id);
    }

    fn apply_command(&mut self, connection_id: ConnectionId, command: ResolvedCommand, now: Instant) {
        let Some(meta) = self.connections.get_mut(connection_id) else {
            return;
        };
        let Some(player_id) = meta.player_id else {
            return;
        };
        meta.touch(now);

        let category = match command.action {
            CommandAction::Spectate => LimitCategory::Spectate,
            CommandAction::Respawn => LimitCategory::Respawn,
            CommandAction::Su => LimitCategory::Su,
            _ => LimitCategory::Any,
        };
        if let Err(violation) = meta.limits.charge(category) {
            warn!("Connection {} {}", connection_id, violation);
            return;
        }

        match command.action {
            CommandAction::Spectate => self.start_spectating(connection_id, player_id, &command.data),
            CommandAction::Respawn => {
                if !meta.request_respawn(now) {
                    debug!("Player {} respawn already pending", player_id);
                    return;
                }
                self.stop_spectating(connection_id, player_id);
                self.forward_action(connection_id, player_id, command);
            }
            _ => self.forward_action(connection_id, player_id, command),
        }
    }

    fn forward_action(&mut self, connection_id: ConnectionId, player_id: PlayerId, command: ResolvedCommand) {
        self.report.actions.push(GameAction {
            connection_id,
            player_id,
            action: command.action,
            data: command.data,
        });
    }

    fn start_spectating(&mut self, connection_id: ConnectionId, player_id: PlayerId, data: &str) {
        let Ok(target_id) = data.trim().parse::<PlayerId>() else {
            debug!("Ignored spectate with bad target '{}'", data);
            return;
        };

        let previous = match self.viewports.subscribe(player_id, target_id) {
            Ok(previous) => previous,
            Err(e) => {
                debug!("Spectate refused: {}", e);
                return;
            }
        };

        let to: Vec<_> = self.current_of(target_id);
        let from: Vec<_> = previous.map(|p| self.current_of(p)).unwrap_or_default();
        let changes = self.router.retarget(connection_id, &from, &to);
        self.send_message(connection_id, &ServerMessage::SpectateStarted { target: target_id });
        self.send_interest_changes(changes);

        debug!("Player {} spectates {}", player_id, target_id);
    }

    fn stop_spectating(&mut self, connection_id: ConnectionId, player_id: PlayerId) {
        let Some(target_id) = self.viewports.unsubscribe(player_id) else {
            return;
        };
        let from = self.current_of(target_id);
        let changes = self.router.detach(connection_id, &from);
        self.send_message(connection_id, &ServerMessage::SpectateStopped);
        self.send_interest_changes(changes);
    }

    fn current_of(&self, player_id: PlayerId) -> Vec<MobId> {
        self.viewports
            .get(player_id)
            .map(|v| v.current.iter().copied().collect())
            .unwrap_or_default()
    }

    fn disconnect(&mut self, connection_id: ConnectionId) {
        self.outbox.unregister(connection_id);
        let Some(mut meta) = self.connections.remove(connection_id) else {
            return;
        };
        meta.status = ConnectionStatus::Disconnecting;

        if meta.is_sync() {
            if self.sync.connection_id() == Some(connection_id) {
                self.sync.deactivate();
            }
            info!("Sync connection {} closed", connection_id);
            return;
        }

        let Some(player_id) = meta.player_id else {
            return;
        };

        if let Some(destroyed) = self.viewports.destroy_viewport(player_id) {
            for subscriber in &destroyed.orphaned_subscribers {
                let Some(subscriber_conn) = self.viewports.get(*subscriber).map(|v| v.connection_id) else {
                    continue;
                };
                let changes = self.router.detach(subscriber_conn, &destroyed.viewport.current);
                self.send_message(subscriber_conn, &ServerMessage::SpectateStopped);
                self.send_interest_changes(changes);
            }
        }
        let dropped = self.router.drop_connection(connection_id);
        self.world.despawn(player_id);

        info!(
            "Player {} left connection {} ({} interests dropped)",
            player_id, connection_id, dropped
        );
    }

    /// Query every viewport in parallel, then apply results one by one
    fn recompute_viewports(&mut self) {
        let ids = self.viewports.ids();
        let viewports = &self.viewports;
        let index = &self.index;
        let visible: Vec<(PlayerId, Option<MobSet>)> = ids
            .par_iter()
            .map(|&id| (id, viewports.visible_in(id, index)))
            .collect();

        for (player_id, set) in visible {
            let Some(set) = set else {
                misuse(ViewportError::NotFound(player_id));
                continue;
            };
            let delta = match self.viewports.apply_visible(player_id, set) {
                Ok(delta) => delta,
                Err(e) => {
                    misuse(e);
                    continue;
                }
            };
            if delta.is_empty() {
                continue;
            }
            match self.router.apply_viewport_delta(&self.viewports, player_id, &delta) {
                Ok(changes) => self.send_interest_changes(changes),
                Err(e) => misuse(e),
            }
        }
    }

    fn apply_mutation(&mut self, mutation: MutationEvent, now: Instant) {
        let message = ServerMessage::MobUpdate {
            id: mutation.mob_id,
            timestamp: mutation.timestamp,
            snapshot: mutation.snapshot.clone(),
        };
        match encode(&message) {
            Ok(bytes) => {
                let payload = Payload::from(bytes);
                let delivered = self.router.route(mutation.mob_id, &payload, &mut self.outbox);
                self.metrics.messages_routed.fetch_add(delivered as u64, Ordering::Relaxed);
            }
            Err(e) => warn!("Failed to encode update for mob {}: {}", mutation.mob_id, e),
        }

        if self.sync.is_tracked(&mutation.object_type) {
            self.sync.enqueue(SyncDataUpdate::new(
                mutation.object_type,
                mutation.object_id,
                mutation.snapshot,
                mutation.timestamp,
                mutation.event,
                now,
            ));
        }
    }

    fn send_message(&mut self, connection_id: ConnectionId, message: &ServerMessage) {
        match encode(message) {
            Ok(bytes) => {
                self.outbox.send(connection_id, Payload::from(bytes));
            }
            Err(e) => warn!("Failed to encode message for {}: {}", connection_id, e),
        }
    }

    fn send_interest_changes(&mut self, changes: InterestChanges) {
        for (connection_id, mob_id) in changes.gained {
            let message = match self.world.get(mob_id) {
                Some(mob) => ServerMessage::MobEntered {
                    id: mob.id,
                    kind: mob.kind,
                    position: mob.position,
                },
                None => continue,
            };
            self.send_message(connection_id, &message);
        }
        for (connection_id, mob_id) in changes.lost {
            self.send_message(connection_id, &ServerMessage::MobLeft { id: mob_id });
        }
    }

    fn connect_sync(&mut self, connection_id: ConnectionId, sender: OutboxSender, now: Instant) {
        if self.sync_secret.is_empty() {
            warn!("Refused sync connection {}: no sync secret configured", connection_id);
            self.report.kick.push(connection_id);
            return;
        }

        let mut meta = ConnectionMeta::new(connection_id, ConnectionRole::Sync, now);
        meta.pending.login = true;
        meta.deadlines.schedule_in(TimerKind::Login, now);
        meta.sync.nonce = handshake::generate_nonce();
        let auth = SyncMessage::Auth {
            nonce: meta.sync.nonce.clone(),
        };
        self.connections.insert(meta);
        self.outbox.register(connection_id, sender);
        self.send_sync_to(connection_id, &auth);

        info!("Sync connection {} opened, awaiting auth", connection_id);
    }

    fn apply_sync_message(&mut self, connection_id: ConnectionId, message: SyncMessage, now: Instant) {
        let Some(meta) = self.connections.get_mut(connection_id) else {
            return;
        };
        if !meta.is_sync() {
            warn!("Sync message on player connection {}", connection_id);
            self.report.kick.push(connection_id);
            return;
        }
        if meta.sync.failed {
            debug!("Ignored sync message on failed connection {}", connection_id);
            self.report.kick.push(connection_id);
            return;
        }
        meta.touch(now);

        match message {
            SyncMessage::AuthResponse { signature } => {
                let result = if meta.sync.auth_complete {
                    Err(HandshakeError::OutOfOrder("auth-response"))
                } else {
                    handshake::verify(&self.sync_secret, &meta.sync.nonce, &signature)
                };
                if let Err(e) = result {
                    warn!("Sync connection {} failed auth: {}", connection_id, e);
                    meta.sync.failed = true;
                    self.report.kick.push(connection_id);
                    return;
                }
                meta.sync.auth_complete = true;
                let init = SyncMessage::Init {
                    server_id: self.sync.storage().this_server_id.clone(),
                    endpoint: self.sync.storage().this_server_endpoint.clone(),
                };
                self.send_sync_to(connection_id, &init);
            }
            SyncMessage::InitAck => {
                if !meta.sync.auth_complete || meta.sync.init_complete {
                    warn!(
                        "Sync connection {}: {}",
                        connection_id,
                        HandshakeError::OutOfOrder("init-ack")
                    );
                    meta.sync.failed = true;
                    self.report.kick.push(connection_id);
                    return;
                }
                meta.sync.init_complete = true;
                meta.pending.login = false;
                meta.status = ConnectionStatus::Connected;
                meta.deadlines.cancel(TimerKind::Login);

                if let Some(previous) = self.sync.connection_id() {
                    if previous != connection_id {
                        info!("Sync connection {} replaces {}", connection_id, previous);
                        self.sync.deactivate();
                        self.report.kick.push(previous);
                    }
                }
                let messages = self.sync.activate(connection_id, now);
                self.send_sync(messages);
            }
            SyncMessage::Ack {
                sequence_id,
                until,
                result,
            } => {
                if self.sync.connection_id() != Some(connection_id) {
                    debug!("Ack on inactive sync connection {}", connection_id);
                    return;
                }
                match until {
                    Some(last) => {
                        let report = self.sync.apply_ack_range(sequence_id, last, result, now);
                        self.report.alarms.extend(report.alarms);
                    }
                    None => {
                        if let Err(alarm) = self.sync.apply_ack(sequence_id, result, now) {
                            self.report.alarms.push(alarm);
                        }
                    }
                }
            }
            SyncMessage::Object { object_type, id, data } => {
                if let Some(object) = self.sync.receive_object(&object_type, &id, &data) {
                    self.report.sync_objects.push(object);
                }
            }
            other => debug!("Unexpected sync message on {}: {:?}", connection_id, other),
        }
    }

    /// Ask the sync service to push an object's state to this room
    pub fn subscribe_object(&mut self, object_type: &str, id: &str) {
        if let Some(message) = self.sync.subscribe_object(object_type, id) {
            self.send_sync(vec![message]);
        }
    }

    /// Operator action: retry an update the sync service rejected. Sends it
    /// right away when the channel is active.
    pub fn requeue_quarantined(&mut self, sequence_id: SequenceId, now: Instant) -> bool {
        if !self.sync.requeue_quarantined(sequence_id, now) {
            return false;
        }
        info!("Sync update {} requeued from quarantine", sequence_id);
        let messages = self.sync.flush(now);
        self.send_sync(messages);
        true
    }

    fn send_sync(&mut self, messages: Vec<SyncMessage>) {
        let Some(connection_id) = self.sync.connection_id() else {
            return;
        };
        for message in &messages {
            self.send_sync_to(connection_id, message);
        }
    }

    fn send_sync_to(&mut self, connection_id: ConnectionId, message: &SyncMessage) {
        match message.to_json() {
            Ok(json) => {
                // A lost frame surfaces later as an ack timeout
                self.outbox.send(connection_id, Payload::from(json.into_bytes()));
            }
            Err(e) => warn!("Failed to serialize sync message: {}", e),
        }
    }

    fn process_connections(&mut self, info: &TickInfo, now: Instant) {
        let elapsed = info.elapsed.as_secs_f32();
        for conn in self.connections.iter_mut() {
            conn.limits.decay(elapsed);
        }

        for (connection_id, kind) in self.connections.take_expired(now) {
            match kind {
                TimerKind::Login | TimerKind::Pong => {
                    warn!("Connection {} timed out ({:?})", connection_id, kind);
                    self.report.kick.push(connection_id);
                }
                TimerKind::Ping => {
                    if let Some(conn) = self.connections.get_mut(connection_id) {
                        conn.ping_sent(now);
                    }
                }
                TimerKind::Respawn => {
                    if let Some(conn) = self.connections.get_mut(connection_id) {
                        conn.finish_respawn();
                        warn!("Connection {} respawn was never confirmed", connection_id);
                    }
                }
                TimerKind::Lagging => {
                    if let Some(conn) = self.connections.get_mut(connection_id) {
                        conn.start_lagging(now);
                        debug!("Connection {} is lagging", connection_id);
                    }
                }
            }
            self.report.expired_timers.push((connection_id, kind));
        }
    }

    fn update_metrics(&self, info: &TickInfo, tick_time: Duration) {
        let m = &self.metrics;
        m.connections_active.store(self.connections.count() as u64, Ordering::Relaxed);
        m.connections_lagging
            .store(self.connections.lagging_count() as u64, Ordering::Relaxed);
        m.viewports.store(self.viewports.len() as u64, Ordering::Relaxed);
        m.mobs.store(self.world.len() as u64, Ordering::Relaxed);
        m.interest_mobs.store(self.router.mob_count() as u64, Ordering::Relaxed);
        m.interest_pairs.store(self.router.pair_count() as u64, Ordering::Relaxed);

        let stats = self.sync.stats();
        m.sync_active.store(self.sync.is_active() as u64, Ordering::Relaxed);
        m.record_sync_depths(self.sync.depths());
        m.sync_next_sequence_id
            .store(self.sync.storage().next_sequence_id(), Ordering::Relaxed);
        m.sync_resends.store(stats.resends, Ordering::Relaxed);
        m.sync_timeouts.store(stats.timeouts, Ordering::Relaxed);
        m.sync_alarms.store(stats.alarms, Ordering::Relaxed);

        m.skipped_frames.fetch_add(info.skipped_frames, Ordering::Relaxed);
        m.record_tick_time(tick_time);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn viewports(&self) -> &ViewportManager {
        &self.viewports
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sync(&self) -> &SyncChannel {
        &self.sync
    }

    pub fn has_outbox(&self, connection_id: ConnectionId) -> bool {
        self.outbox.contains(connection_id)
    }
}

/// Start the game loop background task
pub fn start_game_loop<S>(mut session: GameSession, mut simulation: S, tick_rate: u32) -> JoinHandle<()>
where
    S: Simulation + Send + 'static,
{
    tokio::spawn(async move {
        let tick_duration = Duration::from_secs(1) / tick_rate.max(1);
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Game loop started at {} Hz", tick_rate);
        let start = Instant::now();
        let stats_interval = tick::STATS_LOG_INTERVAL_SECS * tick_rate.max(1) as u64;
        let mut tick_count: u64 = 0;

        loop {
            let now = ticker.tick().await.into_std();
            tick_count += 1;

            let report = session.tick(now, &mut simulation);
            for alarm in &report.alarms {
                error!("Sync alarm: {}", alarm);
            }
            simulation.on_report(&report);

            if tick_count % stats_interval == 0 {
                let depths = session.sync().depths();
                info!(
                    "Room: {}s, frame {}, {} connections, {} viewports, {} mobs | interest {} pairs | sync {} (send {}, ack {}, resend {}, quarantined {})",
                    start.elapsed().as_secs(),
                    report.frame,
                    session.connections().count(),
                    session.viewports().len(),
                    session.world().len(),
                    session.router().pair_count(),
                    if session.sync().is_active() { "active" } else { "inactive" },
                    depths.awaiting_send,
                    depths.awaiting_ack,
                    depths.awaiting_resend,
                    depths.quarantined,
                );
            }
        }
    })
}
