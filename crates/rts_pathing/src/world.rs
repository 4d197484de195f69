//! Mutable state the movement transitions operate on.
//!
//! The [`World`] bundles the static map with the three process-wide
//! structures every unit touches: the unit arena, the unit finder and the
//! path pool. Transition functions receive `&mut World` plus the id of the
//! unit being advanced.

use serde::{Deserialize, Serialize};

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::long_path::{find_long_path, LongPath};
use crate::map::GameMap;
use crate::math::{Point, Rect, Vec2Fixed};
use crate::path::Path;
use crate::short_path::{find_short_path, ShortPath, ShortPathRequest};
use crate::unit_finder::UnitFinder;
use crate::units::{Unit, UnitArena, UnitId};

/// Search work performed during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCounters {
    /// Long searches run.
    pub long_searches: usize,
    /// Short searches run.
    pub short_searches: usize,
    /// Regions expanded over all long searches.
    pub long_expanded: usize,
    /// Nodes expanded over all short searches.
    pub short_expanded: usize,
    /// Largest expansion count of a single short search.
    pub max_short_expanded: usize,
    /// Largest open list of a single short search.
    pub max_short_open: usize,
}

/// Map, units, spatial index and paths.
#[derive(Debug)]
pub struct World {
    /// Static map geometry.
    pub map: GameMap,
    /// Unit pool.
    pub units: UnitArena,
    /// Spatial index over ground units.
    pub finder: UnitFinder,
    /// Path pool.
    pub paths: crate::path::PathPool,
    /// Tunables.
    pub config: NavConfig,
    /// Current tick.
    pub tick: u64,
    /// Search work in the current tick.
    pub counters: SearchCounters,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(map: GameMap, config: NavConfig, unit_capacity: usize) -> Self {
        Self {
            map,
            units: UnitArena::with_capacity(unit_capacity),
            finder: UnitFinder::new(),
            paths: crate::path::PathPool::with_capacity(unit_capacity),
            config,
            tick: 0,
            counters: SearchCounters::default(),
        }
    }

    /// Live unit or [`NavError::UnitNotFound`].
    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.units.get(id).ok_or(NavError::UnitNotFound(id))
    }

    /// Mutable live unit or [`NavError::UnitNotFound`].
    pub fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit> {
        self.units.get_mut(id).ok_or(NavError::UnitNotFound(id))
    }

    /// The unit's path, if it has one.
    pub fn path_of(&self, id: UnitId) -> Result<Option<&Path>> {
        match self.unit(id)?.movement.path {
            Some(pid) => Ok(Some(self.paths.get(pid)?)),
            None => Ok(None),
        }
    }

    /// Mutable path of the unit, if it has one.
    pub fn path_mut_of(&mut self, id: UnitId) -> Result<Option<&mut Path>> {
        match self.unit(id)?.movement.path {
            Some(pid) => Ok(Some(self.paths.get_mut(pid)?)),
            None => Ok(None),
        }
    }

    /// Return the unit's path to the pool.
    pub fn release_path(&mut self, id: UnitId) -> Result<()> {
        if let Some(pid) = self.unit_mut(id)?.movement.path.take() {
            self.paths.free(pid)?;
        }
        Ok(())
    }

    /// Closed area around the target unit where the mover touches it.
    #[must_use]
    pub fn contact_area(&self, unit: &Unit) -> Option<Rect> {
        let target = self.units.get(unit.movement.target_unit?)?;
        let o = target.bbox();
        let e = unit.extents;
        Some(Rect::new(
            o.left - e.right,
            o.top - e.down,
            o.right + e.left,
            o.bottom + e.up,
        ))
    }

    /// Closed range of centers at which the unit's box stays on the map.
    #[must_use]
    pub fn center_range(&self, unit: &Unit) -> Rect {
        let b = self.map.bounds();
        let e = unit.extents;
        let (left, top) = (b.left + e.left, b.top + e.up);
        Rect::new(
            left,
            top,
            (b.right - e.right).max(left),
            (b.bottom - e.down).max(top),
        )
    }

    /// Where the unit should end up: the destination, or the nearest contact
    /// point, pulled in far enough that the unit's box stays on the map.
    #[must_use]
    pub fn goal_point(&self, unit: &Unit) -> Point {
        let goal = match self.contact_area(unit) {
            Some(area) => area.clamp_closed(unit.position()),
            None => unit.movement.destination,
        };
        self.center_range(unit).clamp_closed(goal)
    }

    /// Whether `other` physically blocks `mover`.
    #[must_use]
    pub fn blocks(mover: &Unit, other: &Unit) -> bool {
        other.id != mover.id
            && Some(other.id) != mover.movement.target_unit
            && !other.is_ignored_by(mover)
    }

    /// First unit blocking `mover` inside `bbox`.
    ///
    /// Units already overlapping the mover's current box are skipped so an
    /// overlapping pair can separate.
    pub fn unit_blocker(&self, mover: &Unit, bbox: Rect) -> Result<Option<UnitId>> {
        let current = mover.bbox();
        let mut found = None;
        self.finder.for_each_in_rect(bbox, |id, other_box| {
            let Some(other) = self.units.get(id) else {
                return Ok(true);
            };
            if Self::blocks(mover, other) && !other_box.overlaps(&current) {
                found = Some(id);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// Terrain test using the unit's cached free box.
    #[must_use]
    pub fn terrain_blocked(&self, mover: &Unit, bbox: &Rect) -> bool {
        if mover
            .movement
            .no_collision_box
            .is_some_and(|cache| cache.contains_rect(bbox))
        {
            return false;
        }
        self.map.rect_collides(bbox)
    }

    /// Commit a new exact position and update the spatial index.
    pub fn place(&mut self, id: UnitId, exact: Vec2Fixed) -> Result<()> {
        let reach = self.config.no_collision_reach;
        let unit = self.units.get_mut(id).ok_or(NavError::UnitNotFound(id))?;
        let m = &mut unit.movement;
        m.velocity = exact - m.exact;
        m.exact = exact;
        m.position = exact.to_point();
        m.stepped = true;
        let bbox = unit.extents.bbox_at(unit.movement.position);

        if !unit
            .movement
            .no_collision_box
            .is_some_and(|cache| cache.contains_rect(&bbox))
        {
            unit.movement.no_collision_box = self.map.no_collision_box(&bbox, reach);
        }
        if self.finder.contains(id) {
            self.finder.reinsert(id, bbox)?;
        }
        Ok(())
    }

    /// Long search with bookkeeping.
    pub fn long_search(&mut self, from: Point, to: Point) -> Option<LongPath> {
        let result = find_long_path(self.map.regions(), from, to, &self.config);
        self.counters.long_searches += 1;
        if let Some(r) = &result {
            self.counters.long_expanded += r.expanded;
        }
        result
    }

    /// Short search with bookkeeping.
    pub fn short_search(&mut self, request: &ShortPathRequest) -> Result<ShortPath> {
        let result = find_short_path(&self.map, &self.units, &self.finder, request, &self.config)?;
        let c = &mut self.counters;
        c.short_searches += 1;
        c.short_expanded += result.stats.expanded;
        c.max_short_expanded = c.max_short_expanded.max(result.stats.expanded);
        c.max_short_open = c.max_short_open.max(result.stats.peak_open);
        Ok(result)
    }
}
