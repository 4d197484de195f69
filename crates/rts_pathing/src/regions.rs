//! Region graph used for coarse routing.
//!
//! Regions are normally produced by the map loader. [`RegionGraph::from_tiles`]
//! builds an equivalent partition from a [`TileGrid`] for maps that ship
//! without one (and for tests); [`RegionGraph::from_parts`] accepts external
//! data after validating it.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::math::{Point, Rect};
use crate::terrain::{TileGrid, TILE_SIZE};

/// Index of a region in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u16);

impl RegionId {
    /// Position in the region table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A connected, convex area of uniform walkability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Region identifier (equals its index).
    pub id: RegionId,
    /// Covered area in pixels.
    pub bounds: Rect,
    /// Representative point used as the routing anchor.
    pub center: Point,
    /// Whether ground units may stand in this region.
    pub walkable: bool,
    /// Reachability group; regions in the same group are mutually reachable.
    pub group: u16,
    /// Adjacent walkable regions.
    pub walkable_neighbors: Vec<RegionId>,
    /// Adjacent non-walkable regions.
    pub blocked_neighbors: Vec<RegionId>,
}

/// Immutable partition of a map into regions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionGraph {
    width: u32,
    height: u32,
    regions: Vec<Region>,
    tile_regions: Vec<RegionId>,
}

impl RegionGraph {
    /// Partition a tile grid into rectangles at most `max_side` tiles wide and tall.
    ///
    /// Rectangles are grown greedily in row-major order, first along the row
    /// and then downward while the whole span stays uniform.
    pub fn from_tiles(grid: &TileGrid, max_side: u32) -> Result<Self> {
        let max_side = max_side.max(1);
        let (w, h) = (grid.width(), grid.height());
        let mut assigned: Vec<Option<RegionId>> = vec![None; (w as usize) * (h as usize)];
        let mut areas: Vec<(u32, u32, u32, u32, bool)> = Vec::new();
        let idx = |x: u32, y: u32| (y as usize) * (w as usize) + (x as usize);

        for y in 0..h {
            for x in 0..w {
                if assigned[idx(x, y)].is_some() {
                    continue;
                }
                if areas.len() >= usize::from(u16::MAX) {
                    return Err(NavError::InvalidMap("too many regions".into()));
                }
                let walkable = grid.is_walkable(x, y);
                let id = RegionId(areas.len() as u16);

                let mut x1 = x + 1;
                while x1 < w
                    && x1 - x < max_side
                    && assigned[idx(x1, y)].is_none()
                    && grid.is_walkable(x1, y) == walkable
                {
                    x1 += 1;
                }
                let mut y1 = y + 1;
                while y1 < h
                    && y1 - y < max_side
                    && (x..x1).all(|tx| {
                        assigned[idx(tx, y1)].is_none() && grid.is_walkable(tx, y1) == walkable
                    })
                {
                    y1 += 1;
                }

                for ty in y..y1 {
                    for tx in x..x1 {
                        assigned[idx(tx, ty)] = Some(id);
                    }
                }
                areas.push((x, y, x1, y1, walkable));
            }
        }

        let tile_regions: Vec<RegionId> = assigned
            .into_iter()
            .map(|r| r.ok_or_else(|| NavError::InvalidMap("unassigned tile".into())))
            .collect::<Result<_>>()?;

        let mut adjacency: Vec<BTreeSet<RegionId>> = vec![BTreeSet::new(); areas.len()];
        for y in 0..h {
            for x in 0..w {
                let here = tile_regions[idx(x, y)];
                let mut link = |there: RegionId| {
                    if there != here {
                        adjacency[here.index()].insert(there);
                        adjacency[there.index()].insert(here);
                    }
                };
                if x + 1 < w {
                    link(tile_regions[idx(x + 1, y)]);
                }
                if y + 1 < h {
                    link(tile_regions[idx(x, y + 1)]);
                }
            }
        }

        let mut regions: Vec<Region> = areas
            .iter()
            .enumerate()
            .map(|(i, &(x0, y0, x1, y1, walkable))| {
                let bounds = Rect::new(
                    x0 as i32 * TILE_SIZE,
                    y0 as i32 * TILE_SIZE,
                    x1 as i32 * TILE_SIZE,
                    y1 as i32 * TILE_SIZE,
                );
                let (walkable_neighbors, blocked_neighbors): (Vec<RegionId>, Vec<RegionId>) =
                    adjacency[i]
                        .iter()
                        .copied()
                        .partition(|n| areas[n.index()].4);
                Region {
                    id: RegionId(i as u16),
                    bounds,
                    center: bounds.center(),
                    walkable,
                    group: 0,
                    walkable_neighbors,
                    blocked_neighbors,
                }
            })
            .collect();

        assign_groups(&mut regions);

        Ok(Self {
            width: w,
            height: h,
            regions,
            tile_regions,
        })
    }

    /// Accept a region table and tile lookup produced elsewhere.
    ///
    /// Every tile must map to exactly one existing region, region ids must
    /// equal their index and neighbor lists must reference existing regions.
    pub fn from_parts(
        width: u32,
        height: u32,
        regions: Vec<Region>,
        tile_regions: Vec<RegionId>,
    ) -> Result<Self> {
        if tile_regions.len() != (width as usize) * (height as usize) {
            return Err(NavError::InvalidMap(format!(
                "tile lookup has {} entries, expected {}",
                tile_regions.len(),
                (width as usize) * (height as usize)
            )));
        }
        for (i, region) in regions.iter().enumerate() {
            if region.id.index() != i {
                return Err(NavError::InvalidMap(format!(
                    "region at index {i} carries id {}",
                    region.id.0
                )));
            }
            let dangling = region
                .walkable_neighbors
                .iter()
                .chain(&region.blocked_neighbors)
                .any(|n| n.index() >= regions.len());
            if dangling {
                return Err(NavError::InvalidMap(format!(
                    "region {i} references a missing neighbor"
                )));
            }
        }
        if let Some(bad) = tile_regions.iter().find(|r| r.index() >= regions.len()) {
            return Err(NavError::InvalidMap(format!(
                "tile references missing region {}",
                bad.0
            )));
        }
        Ok(Self {
            width,
            height,
            regions,
            tile_regions,
        })
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when the graph has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    /// All regions in id order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region containing a pixel, `None` outside the map.
    #[must_use]
    pub fn region_at(&self, p: Point) -> Option<RegionId> {
        if p.x < 0 || p.y < 0 {
            return None;
        }
        let (x, y) = ((p.x / TILE_SIZE) as u32, (p.y / TILE_SIZE) as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.tile_regions[(y as usize) * (self.width as usize) + (x as usize)])
    }

    /// Whether two regions share a reachability group.
    #[must_use]
    pub fn same_group(&self, a: RegionId, b: RegionId) -> bool {
        self.region(a).group == self.region(b).group
    }
}

/// Flood walkable adjacency into groups; every blocked region gets its own.
fn assign_groups(regions: &mut [Region]) {
    let mut group: Vec<Option<u16>> = vec![None; regions.len()];
    let mut next = 0u16;
    for start in 0..regions.len() {
        if group[start].is_some() {
            continue;
        }
        group[start] = Some(next);
        if regions[start].walkable {
            let mut queue = VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                for n in &regions[i].walkable_neighbors {
                    if group[n.index()].is_none() {
                        group[n.index()] = Some(next);
                        queue.push_back(n.index());
                    }
                }
            }
        }
        next = next.wrapping_add(1);
    }
    for (region, g) in regions.iter_mut().zip(group) {
        region.group = g.unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> TileGrid {
        TileGrid::from_rows(rows).unwrap()
    }

    #[test]
    fn test_open_map_partition() {
        let graph = RegionGraph::from_tiles(&TileGrid::new(8, 8), 4).unwrap();
        assert_eq!(graph.len(), 4);
        let first = graph.region(RegionId(0));
        assert_eq!(first.bounds, Rect::new(0, 0, 128, 128));
        assert_eq!(first.center, Point::new(64, 64));
        assert!(first.walkable);
        assert_eq!(first.walkable_neighbors.len(), 2);
    }

    #[test]
    fn test_every_tile_has_one_region() {
        let g = grid(&["..#..", "..#..", ".....", "##..#"]);
        let graph = RegionGraph::from_tiles(&g, 4).unwrap();
        for y in 0..4 {
            for x in 0..5 {
                let p = Point::new(x * TILE_SIZE + 5, y * TILE_SIZE + 5);
                let id = graph.region_at(p).unwrap();
                assert!(graph.region(id).bounds.contains(p));
                assert_eq!(
                    graph.region(id).walkable,
                    g.is_walkable(x as u32, y as u32)
                );
            }
        }
    }

    #[test]
    fn test_groups_split_by_wall() {
        let g = grid(&["..#..", "..#..", "..#.."]);
        let graph = RegionGraph::from_tiles(&g, 4).unwrap();
        let left = graph.region_at(Point::new(10, 10)).unwrap();
        let right = graph.region_at(Point::new(4 * 32 + 10, 10)).unwrap();
        let wall = graph.region_at(Point::new(2 * 32 + 10, 10)).unwrap();
        assert!(!graph.same_group(left, right));
        assert!(!graph.same_group(left, wall));
        assert!(graph.region(left).blocked_neighbors.contains(&wall));
    }

    #[test]
    fn test_groups_joined_by_gap() {
        let g = grid(&["..#..", ".....", "..#.."]);
        let graph = RegionGraph::from_tiles(&g, 4).unwrap();
        let left = graph.region_at(Point::new(10, 10)).unwrap();
        let right = graph.region_at(Point::new(4 * 32 + 10, 10)).unwrap();
        assert!(graph.same_group(left, right));
    }

    #[test]
    fn test_region_at_outside_map() {
        let graph = RegionGraph::from_tiles(&TileGrid::new(2, 2), 4).unwrap();
        assert!(graph.region_at(Point::new(-1, 0)).is_none());
        assert!(graph.region_at(Point::new(64, 0)).is_none());
        assert!(graph.region_at(Point::new(63, 63)).is_some());
    }

    #[test]
    fn test_from_parts_validates() {
        let built = RegionGraph::from_tiles(&TileGrid::new(2, 2), 4).unwrap();
        let regions = built.regions().to_vec();
        assert!(RegionGraph::from_parts(2, 2, regions.clone(), vec![RegionId(0); 4]).is_ok());
        assert!(RegionGraph::from_parts(2, 2, regions.clone(), vec![RegionId(0); 3]).is_err());
        assert!(RegionGraph::from_parts(2, 2, regions, vec![RegionId(7); 4]).is_err());
    }
}
