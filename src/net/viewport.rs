//! Per-player viewports
//!
//! Each connected player owns one viewport: a hitbox anchored at the player's
//! horizon point, the set of mobs visible this tick (`current`) and the set of
//! mobs that stopped being visible this tick (`leaved`).
//!
//! Moving the horizon and recomputing membership are separate steps. Any
//! number of horizon updates between ticks collapse into one spatial query per
//! viewport per tick.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::game::constants::viewport::{
    DEFAULT_HALF_HEIGHT, DEFAULT_HALF_WIDTH, MAX_HALF_EXTENT, MIN_HALF_EXTENT,
};
use crate::game::spatial::{Hitbox, MobSet, SpatialIndex};
use crate::game::state::{ConnectionId, MobId, PlayerId};
use crate::util::vec2::Vec2;

/// Misuse of the viewport API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewportError {
    #[error("Viewport already exists for player {0}")]
    AlreadyExists(PlayerId),
    #[error("No viewport for player {0}")]
    NotFound(PlayerId),
    #[error("Player {0} cannot subscribe to itself")]
    SelfSubscription(PlayerId),
}

/// A player's visibility window over the world
#[derive(Debug, Clone)]
pub struct Viewport {
    pub id: PlayerId,
    /// Connection the viewport was created for. Set once, never updated, so it
    /// says nothing about whether the connection is still alive.
    pub connection_id: ConnectionId,
    pub hitbox: Hitbox,
    /// Players receiving this viewport's stream in addition to their own
    pub subs: HashSet<PlayerId>,
    pub current: MobSet,
    pub leaved: MobSet,
}

impl Viewport {
    fn new(id: PlayerId, connection_id: ConnectionId, horizon: Vec2, half_extents: Vec2) -> Self {
        Self {
            id,
            connection_id,
            hitbox: Hitbox::new(horizon, half_extents),
            subs: HashSet::new(),
            current: MobSet::new(),
            leaved: MobSet::new(),
        }
    }

    pub fn horizon(&self) -> Vec2 {
        self.hitbox.center
    }
}

/// Visibility change produced by one recompute. Ids are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportDelta {
    pub entered: Vec<MobId>,
    pub leaved: Vec<MobId>,
}

impl ViewportDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.leaved.is_empty()
    }
}

/// Result of tearing down a viewport
#[derive(Debug)]
pub struct DestroyedViewport {
    pub viewport: Viewport,
    /// Players that were subscribed to the destroyed viewport and lost their
    /// subscription with it
    pub orphaned_subscribers: Vec<PlayerId>,
    /// Target the destroyed player was subscribed to, if any
    pub subscribed_to: Option<PlayerId>,
}

/// Owns every viewport in the room
pub struct ViewportManager {
    viewports: HashMap<PlayerId, Viewport>,
    /// subscriber -> target
    subscriptions: HashMap<PlayerId, PlayerId>,
    half_extents: Vec2,
}

impl ViewportManager {
    pub fn new(half_extents: Vec2) -> Self {
        Self {
            viewports: HashMap::new(),
            subscriptions: HashMap::new(),
            half_extents: clamp_extents(half_extents),
        }
    }

    pub fn create_viewport(
        &mut self,
        player_id: PlayerId,
        connection_id: ConnectionId,
        horizon: Vec2,
    ) -> Result<(), ViewportError> {
        if self.viewports.contains_key(&player_id) {
            return Err(ViewportError::AlreadyExists(player_id));
        }
        self.viewports.insert(
            player_id,
            Viewport::new(player_id, connection_id, horizon, self.half_extents),
        );
        Ok(())
    }

    /// Move the hitbox. Membership changes on the next [`recompute`](Self::recompute).
    pub fn update_horizon(&mut self, player_id: PlayerId, x: f32, y: f32) -> Result<(), ViewportError> {
        let viewport = self
            .viewports
            .get_mut(&player_id)
            .ok_or(ViewportError::NotFound(player_id))?;
        let horizon = Vec2::new(x, y);
        if horizon.is_finite() {
            viewport.hitbox.move_to(horizon);
        } else {
            tracing::debug!("Ignored non-finite horizon for player {}", player_id);
        }
        Ok(())
    }

    /// Change the size of a player's visible region, clamped to sane bounds
    pub fn resize(&mut self, player_id: PlayerId, half_width: f32, half_height: f32) -> Result<(), ViewportError> {
        let viewport = self
            .viewports
            .get_mut(&player_id)
            .ok_or(ViewportError::NotFound(player_id))?;
        viewport.hitbox.half_extents = clamp_extents(Vec2::new(half_width, half_height));
        Ok(())
    }

    /// Query the mobs inside a viewport without touching it. Safe to run for
    /// many viewports in parallel.
    pub fn visible_in(&self, player_id: PlayerId, index: &SpatialIndex) -> Option<MobSet> {
        self.viewports
            .get(&player_id)
            .map(|viewport| index.query(&viewport.hitbox))
    }

    pub fn recompute(&mut self, player_id: PlayerId, index: &SpatialIndex) -> Result<ViewportDelta, ViewportError> {
        let visible = self
            .visible_in(player_id, index)
            .ok_or(ViewportError::NotFound(player_id))?;
        self.apply_visible(player_id, visible)
    }

    /// Replace `current` with a freshly queried set and derive the delta.
    /// The only place `current` and `leaved` change.
    pub fn apply_visible(&mut self, player_id: PlayerId, visible: MobSet) -> Result<ViewportDelta, ViewportError> {
        let viewport = self
            .viewports
            .get_mut(&player_id)
            .ok_or(ViewportError::NotFound(player_id))?;

        let mut entered: Vec<MobId> = visible.difference(&viewport.current).copied().collect();
        let leaved: MobSet = viewport.current.difference(&visible).copied().collect();
        let mut leaved_sorted: Vec<MobId> = leaved.iter().copied().collect();
        entered.sort_unstable();
        leaved_sorted.sort_unstable();

        viewport.current = visible;
        viewport.leaved = leaved;

        Ok(ViewportDelta {
            entered,
            leaved: leaved_sorted,
        })
    }

    /// Subscribe `subscriber_id` to `target_id`'s stream, replacing any
    /// previous subscription. Returns the previous target.
    pub fn subscribe(
        &mut self,
        subscriber_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Option<PlayerId>, ViewportError> {
        if subscriber_id == target_id {
            return Err(ViewportError::SelfSubscription(subscriber_id));
        }
        if !self.viewports.contains_key(&target_id) {
            return Err(ViewportError::NotFound(target_id));
        }

        let previous = self.unsubscribe(subscriber_id);
        if let Some(target) = self.viewports.get_mut(&target_id) {
            target.subs.insert(subscriber_id);
        }
        self.subscriptions.insert(subscriber_id, target_id);
        Ok(previous)
    }

    /// Drop `subscriber_id`'s subscription. Returns the target it had.
    pub fn unsubscribe(&mut self, subscriber_id: PlayerId) -> Option<PlayerId> {
        let target_id = self.subscriptions.remove(&subscriber_id)?;
        if let Some(target) = self.viewports.get_mut(&target_id) {
            target.subs.remove(&subscriber_id);
        }
        Some(target_id)
    }

    pub fn subscription_of(&self, subscriber_id: PlayerId) -> Option<PlayerId> {
        self.subscriptions.get(&subscriber_id).copied()
    }

    /// Remove a viewport and every subscription edge touching it. Calling it
    /// for a player without a viewport returns `None`.
    pub fn destroy_viewport(&mut self, player_id: PlayerId) -> Option<DestroyedViewport> {
        let viewport = self.viewports.remove(&player_id)?;

        let subscribed_to = self.unsubscribe(player_id);

        let mut orphaned_subscribers: Vec<PlayerId> = viewport.subs.iter().copied().collect();
        orphaned_subscribers.sort_unstable();
        for subscriber in &orphaned_subscribers {
            self.subscriptions.remove(subscriber);
        }

        Some(DestroyedViewport {
            viewport,
            orphaned_subscribers,
            subscribed_to,
        })
    }

    /// Connections that receive `player_id`'s stream: its own connection first,
    /// then its subscribers' connections
    pub fn stream_connections(&self, player_id: PlayerId) -> Option<SmallVec<[ConnectionId; 4]>> {
        let viewport = self.viewports.get(&player_id)?;
        let mut out = SmallVec::new();
        out.push(viewport.connection_id);
        out.extend(self.subscriber_connections(viewport));
        Some(out)
    }

    fn subscriber_connections<'a>(&'a self, viewport: &'a Viewport) -> impl Iterator<Item = ConnectionId> + 'a {
        viewport
            .subs
            .iter()
            .filter_map(|sub| self.viewports.get(sub).map(|v| v.connection_id))
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Viewport> {
        self.viewports.get(&player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.viewports.contains_key(&player_id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.viewports.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Viewport> {
        self.viewports.values()
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }
}

impl Default for ViewportManager {
    fn default() -> Self {
        Self::new(Vec2::new(DEFAULT_HALF_WIDTH, DEFAULT_HALF_HEIGHT))
    }
}

fn clamp_extents(half_extents: Vec2) -> Vec2 {
    let sanitize = |v: f32| {
        if v.is_finite() {
            v.clamp(MIN_HALF_EXTENT, MAX_HALF_EXTENT)
        } else {
            MIN_HALF_EXTENT
        }
    };
    Vec2::new(sanitize(half_extents.x), sanitize(half_extents.y))
}
