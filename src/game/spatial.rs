//! Spatial hash grid for viewport visibility queries
//!
//! Divides the world into square cells and stores mob ids per cell. A region
//! query only visits the cells overlapping the region, then checks each
//! candidate's exact position.

use hashbrown::HashSet;
use rustc_hash::FxHashMap;

use crate::game::constants::spatial::{CELL_INITIAL_CAPACITY, GRID_CELL_SIZE, GRID_INITIAL_CAPACITY};
use crate::game::state::{Mob, MobId};
use crate::util::vec2::Vec2;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Set of mob ids returned by a visibility query
pub type MobSet = HashSet<MobId>;

/// Axis-aligned visibility region centred on a horizon point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub center: Vec2,
    pub half_extents: Vec2,
}

impl Hitbox {
    pub fn new(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        self.center - self.half_extents
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        self.center + self.half_extents
    }

    /// Edges are inclusive
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        let min = self.min();
        let max = self.max();
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    pub fn move_to(&mut self, center: Vec2) {
        self.center = center;
    }
}

/// Spatial index over alive mobs
pub struct SpatialIndex {
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    cells: FxHashMap<CellKey, Vec<MobId>>,
    /// Last known position and cell of every indexed mob
    entries: FxHashMap<MobId, (Vec2, CellKey)>,
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        let mut cells = FxHashMap::default();
        cells.reserve(GRID_INITIAL_CAPACITY);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells,
            entries: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Insert a mob or move it to a new position
    pub fn upsert(&mut self, id: MobId, position: Vec2) {
        let cell = self.position_to_cell(position);

        if let Some((old_pos, old_cell)) = self.entries.get_mut(&id) {
            *old_pos = position;
            if *old_cell == cell {
                return;
            }
            let previous = *old_cell;
            *old_cell = cell;
            self.detach(id, previous);
        } else {
            self.entries.insert(id, (position, cell));
        }

        self.cells
            .entry(cell)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push(id);
    }

    /// Remove a mob. Returns false if it was not indexed.
    pub fn remove(&mut self, id: MobId) -> bool {
        match self.entries.remove(&id) {
            Some((_, cell)) => {
                self.detach(id, cell);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, id: MobId, cell: CellKey) {
        if let Some(ids) = self.cells.get_mut(&cell) {
            if let Some(idx) = ids.iter().position(|&m| m == id) {
                ids.swap_remove(idx);
            }
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Replace the whole index with the given mobs
    pub fn rebuild<'a>(&mut self, mobs: impl Iterator<Item = &'a Mob>) {
        self.cells.clear();
        self.entries.clear();
        for mob in mobs {
            self.upsert(mob.id, mob.position);
        }
    }

    /// Collect every indexed mob inside `region`
    pub fn query(&self, region: &Hitbox) -> MobSet {
        let mut out = MobSet::new();
        self.query_into(region, &mut out);
        out
    }

    /// Same as [`query`](Self::query) but reuses the caller's set. The set is
    /// cleared first.
    pub fn query_into(&self, region: &Hitbox, out: &mut MobSet) {
        out.clear();
        if !region.center.is_finite() || !region.half_extents.is_finite() {
            return;
        }

        let (min_cx, min_cy) = self.position_to_cell(region.min());
        let (max_cx, max_cy) = self.position_to_cell(region.max());

        for cx in min_cx..=max_cx {
            for cy in min_cy..=max_cy {
                let Some(ids) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for id in ids {
                    // Entry lookup filters ids detached mid-query
                    if let Some((position, _)) = self.entries.get(id) {
                        if region.contains(*position) {
                            out.insert(*id);
                        }
                    }
                }
            }
        }
    }

    pub fn contains(&self, id: MobId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SpatialIndexStats {
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);
        SpatialIndexStats {
            mob_count: self.entries.len(),
            cell_count: self.cells.len(),
            max_per_cell,
        }
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(GRID_CELL_SIZE)
    }
}

/// Statistics about the spatial index
#[derive(Debug, Clone, Copy)]
pub struct SpatialIndexStats {
    pub mob_count: usize,
    pub cell_count: usize,
    pub max_per_cell: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{MobType, World};

    fn region(x: f32, y: f32, hw: f32, hh: f32) -> Hitbox {
        Hitbox::new(Vec2::new(x, y), Vec2::new(hw, hh))
    }

    #[test]
    fn test_hitbox_contains_edges() {
        let hitbox = region(0.0, 0.0, 10.0, 5.0);
        assert!(hitbox.contains(Vec2::new(10.0, 5.0)));
        assert!(hitbox.contains(Vec2::new(-10.0, -5.0)));
        assert!(!hitbox.contains(Vec2::new(10.1, 0.0)));
        assert!(!hitbox.contains(Vec2::new(0.0, -5.1)));
    }

    #[test]
    fn test_insert_and_query() {
        let mut index = SpatialIndex::new(64.0);
        index.upsert(1, Vec2::new(10.0, 10.0));
        index.upsert(2, Vec2::new(500.0, 500.0));
        index.upsert(3, Vec2::new(-30.0, 20.0));

        let visible = index.query(&region(0.0, 0.0, 100.0, 100.0));
        assert_eq!(visible.len(), 2);
        assert!(visible.contains(&1));
        assert!(visible.contains(&3));
        assert!(!visible.contains(&2));
    }

    #[test]
    fn test_query_spans_many_cells() {
        let mut index = SpatialIndex::new(16.0);
        for i in 0..50u32 {
            index.upsert(i, Vec2::new(i as f32 * 10.0, 0.0));
        }

        let visible = index.query(&region(245.0, 0.0, 245.0, 1.0));
        assert_eq!(visible.len(), 50);
    }

    #[test]
    fn test_moving_mob_changes_cell() {
        let mut index = SpatialIndex::new(64.0);
        index.upsert(1, Vec2::new(0.0, 0.0));
        index.upsert(1, Vec2::new(1000.0, 1000.0));

        assert_eq!(index.len(), 1);
        assert!(index.query(&region(0.0, 0.0, 50.0, 50.0)).is_empty());
        assert!(index.query(&region(1000.0, 1000.0, 50.0, 50.0)).contains(&1));
        assert_eq!(index.stats().cell_count, 1);
    }

    #[test]
    fn test_removed_mob_not_found() {
        let mut index = SpatialIndex::new(64.0);
        index.upsert(1, Vec2::new(0.0, 0.0));
        index.upsert(2, Vec2::new(5.0, 5.0));

        assert!(index.remove(1));
        assert!(!index.remove(1));

        let visible = index.query(&region(0.0, 0.0, 50.0, 50.0));
        assert_eq!(visible.len(), 1);
        assert!(visible.contains(&2));
    }

    #[test]
    fn test_rebuild_from_world() {
        let mut world = World::new();
        world.spawn(Mob::new(1, MobType::Player, Vec2::new(0.0, 0.0)));
        world.spawn(Mob::new(2, MobType::Missile, Vec2::new(20.0, 0.0)));

        let mut index = SpatialIndex::default();
        index.upsert(99, Vec2::ZERO);
        index.rebuild(world.iter());

        assert!(!index.contains(99));
        assert_eq!(index.len(), 2);

        world.despawn(2);
        index.rebuild(world.iter());
        let visible = index.query(&region(0.0, 0.0, 100.0, 100.0));
        assert_eq!(visible.len(), 1);
        assert!(visible.contains(&1));
    }

    #[test]
    fn test_non_finite_region_is_empty() {
        let mut index = SpatialIndex::default();
        index.upsert(1, Vec2::ZERO);
        let visible = index.query(&region(f32::NAN, 0.0, 10.0, 10.0));
        assert!(visible.is_empty());
    }

    #[test]
    fn test_query_into_clears_previous() {
        let mut index = SpatialIndex::default();
        index.upsert(1, Vec2::ZERO);

        let mut out = MobSet::new();
        out.insert(42);
        index.query_into(&region(0.0, 0.0, 10.0, 10.0), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out.contains(&1));
    }
}
