//! World objects the room core observes
//!
//! The simulation (physics, AI, spawning) owns the behaviour of mobs; the core
//! only needs their identity, kind and position to answer visibility queries.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

pub type MobId = u32;
pub type PlayerId = MobId;
pub type TeamId = u16;
pub type ConnectionId = u64;
/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`]
pub fn now_millis() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Kind of simulated world object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MobType {
    Player,
    Missile,
    Powerup,
    Flag,
}

/// A simulated world object as seen by the visibility layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mob {
    pub id: MobId,
    pub kind: MobType,
    pub position: Vec2,
}

impl Mob {
    pub fn new(id: MobId, kind: MobType, position: Vec2) -> Self {
        Self { id, kind, position }
    }
}

/// Alive mobs keyed by id
#[derive(Debug, Default)]
pub struct World {
    mobs: HashMap<MobId, Mob>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mob. Returns the previous entry for the id, if any.
    pub fn spawn(&mut self, mob: Mob) -> Option<Mob> {
        if !mob.position.is_finite() {
            tracing::warn!("Rejected mob {} with non-finite position", mob.id);
            return None;
        }
        self.mobs.insert(mob.id, mob)
    }

    pub fn despawn(&mut self, id: MobId) -> Option<Mob> {
        self.mobs.remove(&id)
    }

    /// Move a mob. Returns false if the mob no longer exists or the position is
    /// not finite.
    pub fn set_position(&mut self, id: MobId, position: Vec2) -> bool {
        if !position.is_finite() {
            tracing::warn!("Ignored non-finite position for mob {}", id);
            return false;
        }
        match self.mobs.get_mut(&id) {
            Some(mob) => {
                mob.position = position;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MobId) -> Option<&Mob> {
        self.mobs.get(&id)
    }

    pub fn contains(&self, id: MobId) -> bool {
        self.mobs.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mob> {
        self.mobs.values()
    }

    pub fn len(&self) -> usize {
        self.mobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_despawn() {
        let mut world = World::new();
        assert!(world.spawn(Mob::new(1, MobType::Player, Vec2::new(0.0, 0.0))).is_none());
        assert!(world.contains(1));
        assert_eq!(world.len(), 1);

        let removed = world.despawn(1);
        assert_eq!(removed.map(|m| m.id), Some(1));
        assert!(world.is_empty());
        assert!(world.despawn(1).is_none());
    }

    #[test]
    fn test_set_position() {
        let mut world = World::new();
        world.spawn(Mob::new(7, MobType::Missile, Vec2::ZERO));

        assert!(world.set_position(7, Vec2::new(10.0, -5.0)));
        assert_eq!(world.get(7).map(|m| m.position), Some(Vec2::new(10.0, -5.0)));
        assert!(!world.set_position(8, Vec2::ZERO));
    }

    #[test]
    fn test_rejects_non_finite_positions() {
        let mut world = World::new();
        world.spawn(Mob::new(1, MobType::Powerup, Vec2::new(f32::NAN, 0.0)));
        assert!(!world.contains(1));

        world.spawn(Mob::new(2, MobType::Flag, Vec2::ZERO));
        assert!(!world.set_position(2, Vec2::new(0.0, f32::INFINITY)));
        assert_eq!(world.get(2).map(|m| m.position), Some(Vec2::ZERO));
    }
}
