//! Region-level A*.
//!
//! Produces a corridor of regions from the source's region toward the
//! destination's region. The search is bounded by open-list and expansion
//! budgets; when they run out, or when the destination is not reachable,
//! the region closest to the destination is accepted instead.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::NavConfig;
use crate::math::Point;
use crate::regions::{RegionGraph, RegionId};

/// Result of a long search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongPath {
    /// Regions in walking order, destination end kept when truncated.
    pub regions: Vec<RegionId>,
    /// Region count of the full route.
    pub total_len: usize,
    /// Summed edge cost of the full route.
    pub cost: u32,
    /// The destination's region ends the route.
    pub fully_reached: bool,
    /// The route was longer than the corridor cap.
    pub truncated: bool,
    /// Regions expanded by the search.
    pub expanded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f: u32,
    h: u32,
    seq: u32,
    region: RegionId,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (f, h, seq).
        (other.f, other.h, other.seq).cmp(&(self.f, self.h, self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    g: u32,
    h: u32,
    parent: Option<RegionId>,
    closed: bool,
}

/// Plan a corridor from `source` to `destination`.
///
/// Returns `None` only when either point lies outside the map.
#[must_use]
pub fn find_long_path(
    graph: &RegionGraph,
    source: Point,
    destination: Point,
    config: &NavConfig,
) -> Option<LongPath> {
    let from = graph.region_at(source)?;
    let to = graph.region_at(destination)?;

    if from == to {
        return Some(LongPath {
            regions: vec![from],
            total_len: 1,
            cost: 0,
            fully_reached: true,
            truncated: false,
            expanded: 0,
        });
    }

    // Where a region is entered: the exact endpoints for the two end regions.
    let anchor = |id: RegionId| -> Point {
        if id == from {
            source
        } else if id == to {
            destination
        } else {
            graph.region(id).center
        }
    };

    let mut nodes: HashMap<RegionId, SearchNode> = HashMap::new();
    let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
    let mut open_count = 0usize;
    let mut seq = 0u32;
    let mut expanded = 0usize;

    let start_h = source.distance(destination);
    nodes.insert(
        from,
        SearchNode {
            g: 0,
            h: start_h,
            parent: None,
            closed: false,
        },
    );
    open.push(OpenEntry {
        f: start_h,
        h: start_h,
        seq,
        region: from,
    });
    open_count += 1;

    let mut reached = false;
    while let Some(entry) = open.pop() {
        let Some(node) = nodes.get(&entry.region).copied() else {
            continue;
        };
        if node.closed || entry.f != node.g.saturating_add(node.h) {
            // Superseded by a cheaper push.
            continue;
        }
        open_count -= 1;
        if entry.region == to {
            reached = true;
            break;
        }
        if expanded >= config.long_expand_limit {
            break;
        }
        expanded += 1;
        if let Some(n) = nodes.get_mut(&entry.region) {
            n.closed = true;
        }

        let here = graph.region(entry.region);
        let here_anchor = anchor(entry.region);
        for &next in &here.walkable_neighbors {
            let next_anchor = anchor(next);
            let mut step = here_anchor.distance(next_anchor).max(1);
            // Flood-filled graphs keep walkable links inside one group; a
            // provider graph from `RegionGraph::from_parts` may not.
            if graph.region(next).group != here.group {
                step = step.saturating_mul(2);
            }
            let g = node.g.saturating_add(step);

            match nodes.get_mut(&next) {
                Some(existing) if existing.closed || existing.g <= g => continue,
                Some(existing) => {
                    existing.g = g;
                    existing.parent = Some(entry.region);
                }
                None => {
                    if open_count >= config.long_open_limit {
                        continue;
                    }
                    open_count += 1;
                    nodes.insert(
                        next,
                        SearchNode {
                            g,
                            h: next_anchor.distance(destination),
                            parent: Some(entry.region),
                            closed: false,
                        },
                    );
                }
            }
            let h = nodes.get(&next).map_or(0, |n| n.h);
            seq += 1;
            open.push(OpenEntry {
                f: g.saturating_add(h),
                h,
                seq,
                region: next,
            });
        }
    }

    let end = if reached {
        to
    } else {
        // Best effort: the region closest to the destination.
        nodes
            .iter()
            .min_by_key(|(id, n)| (n.h, n.g, **id))
            .map_or(from, |(id, _)| *id)
    };

    let mut route = vec![end];
    let mut cursor = end;
    while let Some(parent) = nodes.get(&cursor).and_then(|n| n.parent) {
        route.push(parent);
        cursor = parent;
    }
    route.reverse();

    let total_len = route.len();
    let cost = nodes.get(&end).map_or(0, |n| n.g);
    let truncated = total_len > config.corridor_cap.max(1);
    if truncated {
        route.drain(..total_len - config.corridor_cap.max(1));
    }

    tracing::trace!(
        expanded,
        total_len,
        reached,
        truncated,
        "long path search"
    );

    Some(LongPath {
        regions: route,
        total_len,
        cost,
        fully_reached: reached,
        truncated,
        expanded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rect;
    use crate::regions::Region;
    use crate::terrain::TileGrid;

    fn graph(rows: &[&str], side: u32) -> RegionGraph {
        RegionGraph::from_tiles(&TileGrid::from_rows(rows).unwrap(), side).unwrap()
    }

    #[test]
    fn test_same_region_is_trivial() {
        let g = graph(&["....", "...."], 4);
        let path = find_long_path(&g, Point::new(5, 5), Point::new(100, 50), &NavConfig::default()).unwrap();
        assert_eq!(path.regions.len(), 1);
        assert_eq!(path.expanded, 0);
        assert!(path.fully_reached);
    }

    #[test]
    fn test_routes_around_wall() {
        let g = graph(
            &[
                "........", //
                "..####..",
                "..#..#..",
                "..#..#..",
                "........",
            ],
            1,
        );
        let source = Point::new(16, 80);
        let destination = Point::new(7 * 32 + 16, 80);
        let path = find_long_path(&g, source, destination, &NavConfig::default()).unwrap();
        assert!(path.fully_reached);
        assert_eq!(path.regions.first(), g.region_at(source).as_ref());
        assert_eq!(path.regions.last(), g.region_at(destination).as_ref());
        for pair in path.regions.windows(2) {
            assert!(g.region(pair[0]).walkable_neighbors.contains(&pair[1]));
        }
        assert!(path.regions.iter().all(|r| g.region(*r).walkable));
    }

    #[test]
    fn test_unreachable_group_gives_best_effort() {
        let g = graph(&["...#...", "...#...", "...#..."], 1);
        let source = Point::new(16, 16);
        let destination = Point::new(6 * 32 + 16, 16);
        let path = find_long_path(&g, source, destination, &NavConfig::default()).unwrap();
        assert!(!path.fully_reached);
        assert!(!path.regions.is_empty());
        // Ends beside the wall, as close as the source's group gets.
        let last = g.region(*path.regions.last().unwrap());
        assert_eq!(last.bounds.right, 3 * 32);
        assert!(path.expanded <= NavConfig::default().long_expand_limit);
    }

    #[test]
    fn test_budget_exhaustion_is_best_effort() {
        let rows: Vec<String> = (0..40).map(|_| ".".repeat(40)).collect();
        let g = RegionGraph::from_tiles(&TileGrid::from_rows(&rows).unwrap(), 1).unwrap();
        let config = NavConfig {
            long_expand_limit: 10,
            ..NavConfig::default()
        };
        let path = find_long_path(&g, Point::new(16, 16), Point::new(1270, 1270), &config).unwrap();
        assert!(!path.fully_reached);
        assert!(path.expanded <= 10);
        assert!(path.regions.len() > 1);
    }

    #[test]
    fn test_corridor_keeps_destination_end() {
        let rows = vec![".".repeat(80)];
        let g = RegionGraph::from_tiles(&TileGrid::from_rows(&rows).unwrap(), 1).unwrap();
        let destination = Point::new(79 * 32 + 16, 16);
        let path = find_long_path(&g, Point::new(16, 16), destination, &NavConfig::default()).unwrap();
        assert!(path.fully_reached);
        assert!(path.truncated);
        assert_eq!(path.total_len, 80);
        assert_eq!(path.regions.len(), 50);
        assert_eq!(path.regions.last(), g.region_at(destination).as_ref());
    }

    fn region(id: u16, bounds: Rect, group: u16, neighbors: &[u16]) -> Region {
        Region {
            id: RegionId(id),
            bounds,
            center: bounds.center(),
            walkable: true,
            group,
            walkable_neighbors: neighbors.iter().map(|&n| RegionId(n)).collect(),
            blocked_neighbors: Vec::new(),
        }
    }

    #[test]
    fn test_group_change_costs_double() {
        // Two lanes between a left and a right column. The upper lane is
        // shorter but belongs to another group.
        let regions = vec![
            region(0, Rect::new(0, 0, 32, 64), 0, &[1, 2]),
            region(1, Rect::new(32, 0, 64, 32), 1, &[0, 3]),
            region(2, Rect::new(32, 32, 64, 64), 0, &[0, 3]),
            region(3, Rect::new(64, 0, 96, 64), 0, &[1, 2]),
        ];
        let tiles = [0, 1, 3, 0, 2, 3].map(RegionId).to_vec();
        let g = RegionGraph::from_parts(3, 2, regions, tiles).unwrap();

        let path = find_long_path(&g, Point::new(16, 10), Point::new(80, 10), &NavConfig::default()).unwrap();
        assert!(path.fully_reached);
        assert_eq!(path.regions, vec![RegionId(0), RegionId(2), RegionId(3)]);
        assert_eq!(path.cost, 98);
    }

    #[test]
    fn test_outside_map_is_none() {
        let g = graph(&["...."], 4);
        assert!(find_long_path(&g, Point::new(-5, 0), Point::new(5, 5), &NavConfig::default()).is_none());
    }
}
