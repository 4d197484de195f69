//! Pooled per-unit path records.
//!
//! A [`Path`] carries the long corridor, the current short leg and the
//! cursors into both. Paths live in a [`PathPool`] with a LIFO free list.
//! Freeing a path keeps its `last_blocker`, and the next allocation reuses
//! the most recently freed slot, so a unit that drops its path and
//! immediately replans still knows which unit blocked it.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::math::Point;
use crate::regions::RegionId;
use crate::units::UnitId;

/// Generation-checked handle to a pooled path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathId {
    index: u32,
    generation: u32,
}

impl PathId {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

/// Movement plan of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// Regions from (or toward) the source to the destination.
    pub corridor: Vec<RegionId>,
    /// Region count of the full route before truncation.
    pub total_len: usize,
    /// Index of the corridor region the unit is in.
    pub long_cursor: usize,
    /// True when the corridor is the destination end of a longer route.
    pub truncated: bool,
    /// Current short leg, start excluded.
    pub waypoints: Vec<Point>,
    /// Index of the waypoint being steered toward.
    pub short_cursor: usize,
    /// Where the unit stood when the path was planned.
    pub source: Point,
    /// Final destination.
    pub destination: Point,
    /// Unit whose footprint is the real goal.
    pub target_unit: Option<UnitId>,
    /// Order the path was planned for.
    pub order_serial: u32,
    /// Tick the corridor was computed.
    pub created_tick: u64,
    /// Corridor must be recomputed before the next leg.
    pub needs_replan: bool,
    /// The long search reached the destination region.
    pub fully_reached: bool,
    /// The current short leg reached its target.
    pub leg_reached: bool,
    /// The current short leg ends at the destination.
    pub final_leg: bool,
    /// Source and destination share a reachability group.
    pub reachable: bool,
    /// Unit that last blocked movement along this path. May be gone.
    pub last_blocker: Option<UnitId>,
}

impl Path {
    /// Waypoint currently steered toward.
    #[must_use]
    pub fn current_waypoint(&self) -> Option<Point> {
        self.waypoints.get(self.short_cursor).copied()
    }

    /// Step to the next waypoint; false when the leg is finished.
    pub fn advance_waypoint(&mut self) -> bool {
        if self.short_cursor < self.waypoints.len() {
            self.short_cursor += 1;
        }
        self.short_cursor < self.waypoints.len()
    }

    /// True when every waypoint of the leg has been visited.
    #[must_use]
    pub fn leg_finished(&self) -> bool {
        self.short_cursor >= self.waypoints.len()
    }

    /// Corridor regions not yet entered, the current one included.
    #[must_use]
    pub fn remaining_regions(&self) -> usize {
        self.corridor.len().saturating_sub(self.long_cursor)
    }

    /// Whether the corridor can serve another leg without a new long search.
    #[must_use]
    pub fn corridor_reusable(&self, now: u64, min_legs: usize, stale_ticks: u64) -> bool {
        !self.needs_replan
            && !self.corridor.is_empty()
            && self.remaining_regions() >= min_legs
            && now.saturating_sub(self.created_tick) < stale_ticks
    }

    /// Replace the short leg.
    pub fn set_leg(&mut self, waypoints: Vec<Point>, reached: bool) {
        self.waypoints = waypoints;
        self.short_cursor = 0;
        self.leg_reached = reached;
    }

    fn reset(&mut self) {
        let last_blocker = self.last_blocker;
        *self = Self {
            last_blocker,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct PathSlot {
    generation: u32,
    live: bool,
    path: Path,
}

/// Fixed-capacity path arena with LIFO reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathPool {
    slots: Vec<PathSlot>,
    free: Vec<u32>,
    capacity: usize,
}

impl PathPool {
    /// Create an empty pool.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
        }
    }

    /// Number of live paths.
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Allocate a path, reusing the most recently freed slot first.
    ///
    /// Every field is reset except `last_blocker`.
    pub fn alloc(&mut self) -> Result<PathId> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else if self.slots.len() < self.capacity {
            self.slots.push(PathSlot {
                generation: 0,
                live: false,
                path: Path::default(),
            });
            (self.slots.len() - 1) as u32
        } else {
            return Err(NavError::PathCapacityExceeded {
                capacity: self.capacity,
            });
        };
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        slot.path.reset();
        Ok(PathId {
            index,
            generation: slot.generation,
        })
    }

    /// Return a path to the pool.
    pub fn free(&mut self, id: PathId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(())
    }

    /// Path behind a live handle.
    pub fn get(&self, id: PathId) -> Result<&Path> {
        self.slots
            .get(id.index())
            .filter(|s| s.live && s.generation == id.generation)
            .map(|s| &s.path)
            .ok_or(NavError::StalePath(id))
    }

    /// Mutable path behind a live handle.
    pub fn get_mut(&mut self, id: PathId) -> Result<&mut Path> {
        Ok(&mut self.slot_mut(id)?.path)
    }

    fn slot_mut(&mut self, id: PathId) -> Result<&mut PathSlot> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.live && s.generation == id.generation)
            .ok_or(NavError::StalePath(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use crate::units::{UnitArena, UnitSpec};

    #[test]
    fn test_alloc_free_lifo() {
        let mut pool = PathPool::with_capacity(4);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        pool.free(a).unwrap();
        pool.free(b).unwrap();
        let c = pool.alloc().unwrap();
        assert_eq!(c.index(), b.index());
        let d = pool.alloc().unwrap();
        assert_eq!(d.index(), a.index());
    }

    #[test]
    fn test_stale_handle_is_error() {
        let mut pool = PathPool::with_capacity(2);
        let a = pool.alloc().unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.get(a), Err(NavError::StalePath(a)));
        assert_eq!(pool.free(a), Err(NavError::StalePath(a)));
        let b = pool.alloc().unwrap();
        assert!(pool.get(a).is_err());
        assert!(pool.get(b).is_ok());
    }

    #[test]
    fn test_capacity() {
        let mut pool = PathPool::with_capacity(1);
        pool.alloc().unwrap();
        assert_eq!(
            pool.alloc(),
            Err(NavError::PathCapacityExceeded { capacity: 1 })
        );
    }

    #[test]
    fn test_last_blocker_survives_reuse() {
        let mut arena = UnitArena::with_capacity(1);
        let blocker = arena
            .spawn(&UnitSpec::ground(Point::new(0, 0), 4, Fixed::ONE))
            .unwrap();

        let mut pool = PathPool::with_capacity(2);
        let a = pool.alloc().unwrap();
        {
            let path = pool.get_mut(a).unwrap();
            path.last_blocker = Some(blocker);
            path.waypoints = vec![Point::new(5, 5)];
            path.needs_replan = true;
        }
        pool.free(a).unwrap();
        let b = pool.alloc().unwrap();
        let path = pool.get(b).unwrap();
        assert_eq!(path.last_blocker, Some(blocker));
        assert!(path.waypoints.is_empty());
        assert!(!path.needs_replan);
    }

    #[test]
    fn test_corridor_reuse_rules() {
        let mut path = Path {
            corridor: (0..6).map(RegionId).collect(),
            created_tick: 100,
            ..Path::default()
        };
        assert!(path.corridor_reusable(110, 4, 240));
        path.long_cursor = 3;
        assert!(!path.corridor_reusable(110, 4, 240));
        path.long_cursor = 0;
        assert!(!path.corridor_reusable(340, 4, 240));
        path.needs_replan = true;
        assert!(!path.corridor_reusable(110, 4, 240));
    }

    #[test]
    fn test_waypoint_cursor() {
        let mut path = Path::default();
        path.set_leg(vec![Point::new(1, 1), Point::new(2, 2)], true);
        assert_eq!(path.current_waypoint(), Some(Point::new(1, 1)));
        assert!(path.advance_waypoint());
        assert!(!path.advance_waypoint());
        assert!(path.leg_finished());
        assert_eq!(path.current_waypoint(), None);
    }
}
