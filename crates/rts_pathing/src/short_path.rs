//! Local A* over edges synthesized on demand.
//!
//! The search runs in *center space*: every obstacle (terrain contour or
//! unit box) is inflated by the mover's footprint, so the mover reduces to
//! a point. Each inflated boundary is a [`LocalEdge`]. A straight move is
//! legal unless it crosses some edge from its free side into its blocked
//! side inside the edge's open span.
//!
//! Expanding a node gathers the edges near a square window around it and
//! casts a ray in each compass direction. A ray that hits an edge offers
//! the two ends of that edge as neighbors; a ray that leaves the window
//! offers the window boundary point. The goal itself is offered whenever
//! it is in direct reach.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::NavConfig;
use crate::contours::{ContourSegment, Facing};
use crate::error::{NavError, Result};
use crate::map::GameMap;
use crate::math::{Point, Ratio, Rect};
use crate::regions::RegionId;
use crate::unit_finder::UnitFinder;
use crate::units::{Extents, Unit, UnitArena, UnitId};

/// An inflated obstacle boundary in center space.
///
/// For `Up`/`Down` the edge lies on `y = pos` and spans the open interval
/// `(from, to)` in x; for `Left`/`Right` it lies on `x = pos` and spans y.
/// `facing` is the free side: an `Up` edge blocks centers with `y > pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalEdge {
    /// Free side.
    pub facing: Facing,
    /// Coordinate on the fixed axis.
    pub pos: i32,
    /// Open span start.
    pub from: i32,
    /// Open span end.
    pub to: i32,
}

impl LocalEdge {
    /// Inflate a boundary by a unit footprint.
    #[must_use]
    pub fn inflate(seg: &ContourSegment, ext: Extents) -> Self {
        let (pos, from, to) = match seg.facing {
            Facing::Up => (seg.pos - ext.down, seg.from - ext.right, seg.to + ext.left),
            Facing::Down => (seg.pos + ext.up, seg.from - ext.right, seg.to + ext.left),
            Facing::Left => (seg.pos - ext.right, seg.from - ext.down, seg.to + ext.up),
            Facing::Right => (seg.pos + ext.left, seg.from - ext.down, seg.to + ext.up),
        };
        Self {
            facing: seg.facing,
            pos,
            from,
            to,
        }
    }

    /// Map `p` to (along, across) with the blocked side at `across > pos`.
    fn project(&self, p: Point) -> (i64, i64) {
        let (along, across) = if self.facing.is_horizontal_edge() {
            (p.x, p.y)
        } else {
            (p.y, p.x)
        };
        match self.facing {
            Facing::Up | Facing::Left => (i64::from(along), i64::from(across)),
            Facing::Down | Facing::Right => (i64::from(along), -i64::from(across)),
        }
    }

    fn signed_pos(&self) -> i64 {
        match self.facing {
            Facing::Up | Facing::Left => i64::from(self.pos),
            Facing::Down | Facing::Right => -i64::from(self.pos),
        }
    }

    /// True when moving the center from `a` to `b` enters this edge's blocked side.
    #[must_use]
    pub fn blocks(&self, a: Point, b: Point) -> bool {
        let pos = self.signed_pos();
        let (a_along, a_across) = self.project(a);
        let (b_along, b_across) = self.project(b);
        if a_across > pos || b_across <= pos {
            return false;
        }
        // Along-coordinate where the segment crosses the edge line.
        let d_across = b_across - a_across;
        let cross = Ratio::new(a_along * d_across + (pos - a_across) * (b_along - a_along), d_across);
        let (from, to) = (i64::from(self.from), i64::from(self.to));
        (cross.lt_int(to) || b_along < to) && (cross.gt_int(from) || b_along > from)
    }

    /// True when `p` lies on the blocked side inside the span.
    #[must_use]
    pub fn covers(&self, p: Point) -> bool {
        let (along, across) = self.project(p);
        across > self.signed_pos() && along > i64::from(self.from) && along < i64::from(self.to)
    }
}

/// The four faces of a box as boundary segments with outward free sides.
fn box_faces(r: &Rect) -> [ContourSegment; 4] {
    [
        ContourSegment {
            pos: r.top,
            from: r.left,
            to: r.right,
            facing: Facing::Up,
        },
        ContourSegment {
            pos: r.bottom,
            from: r.left,
            to: r.right,
            facing: Facing::Down,
        },
        ContourSegment {
            pos: r.left,
            from: r.top,
            to: r.bottom,
            facing: Facing::Left,
        },
        ContourSegment {
            pos: r.right,
            from: r.top,
            to: r.bottom,
            facing: Facing::Right,
        },
    ]
}

/// A short search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortPathRequest {
    /// Unit being moved.
    pub mover: UnitId,
    /// Current center.
    pub start: Point,
    /// Local target.
    pub goal: Point,
    /// Unit whose footprint is the real goal.
    pub target_unit: Option<UnitId>,
    /// Treat moving units as obstacles too.
    pub include_movers: bool,
    /// Unit treated as an obstacle even while it moves. A stale handle
    /// means no such unit.
    pub avoid: Option<UnitId>,
}

/// Search counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Nodes expanded.
    pub expanded: usize,
    /// Nodes created.
    pub generated: usize,
    /// Largest open-list size.
    pub peak_open: usize,
}

/// Result of a short search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPath {
    /// Waypoints after the start, smoothed.
    pub waypoints: Vec<Point>,
    /// The goal (or the target unit's contact area) was reached.
    pub reached: bool,
    /// Search counters.
    pub stats: SearchStats,
}

/// Obstacles seen by one mover.
pub struct Obstacles<'a> {
    map: &'a GameMap,
    units: &'a UnitArena,
    finder: &'a UnitFinder,
    mover: &'a Unit,
    target_unit: Option<UnitId>,
    include_movers: bool,
    avoid: Option<UnitId>,
    margin: i32,
}

impl<'a> Obstacles<'a> {
    /// Obstacles for `mover`, skipping `target_unit` and optionally moving units.
    pub fn new(
        map: &'a GameMap,
        units: &'a UnitArena,
        finder: &'a UnitFinder,
        mover: UnitId,
        target_unit: Option<UnitId>,
        include_movers: bool,
    ) -> Result<Self> {
        let mover = units.get(mover).ok_or(NavError::UnitNotFound(mover))?;
        let e = mover.extents;
        Ok(Self {
            map,
            units,
            finder,
            mover,
            target_unit,
            include_movers,
            avoid: None,
            margin: e.left.max(e.right).max(e.up).max(e.down) + 1,
        })
    }

    /// Also treat `unit` as solid while it moves.
    #[must_use]
    pub fn avoiding(mut self, unit: Option<UnitId>) -> Self {
        self.avoid = unit;
        self
    }

    fn ignores(&self, id: UnitId) -> bool {
        if id == self.mover.id || Some(id) == self.target_unit {
            return true;
        }
        match self.units.get(id) {
            None => true,
            Some(other) => {
                let moving_through =
                    !self.include_movers && other.is_moving() && Some(id) != self.avoid;
                other.is_ignored_by(self.mover) || moving_through
            }
        }
    }

    /// Edges that may intersect `area`.
    pub fn gather(&self, area: Rect) -> Result<Vec<LocalEdge>> {
        let ext = self.mover.extents;
        let reach = area.expand(self.margin);
        let mut edges = Vec::new();
        for facing in Facing::ALL {
            edges.extend(
                self.map
                    .contours()
                    .segments_in(facing, reach)
                    .map(|seg| LocalEdge::inflate(seg, ext)),
            );
        }
        self.finder.for_each_in_rect(reach, |id, bbox| {
            if !self.ignores(id) {
                edges.extend(box_faces(&bbox).iter().map(|f| LocalEdge::inflate(f, ext)));
            }
            Ok(true)
        })?;
        Ok(edges)
    }

    /// Whether the mover's center can travel straight from `a` to `b`.
    pub fn straight_move_clear(&self, a: Point, b: Point) -> Result<bool> {
        let edges = self.gather(Rect::spanning(a, b))?;
        Ok(move_clear(&edges, a, b))
    }

    /// Closed contact area around the target unit, in center space.
    fn contact_area(&self) -> Option<Rect> {
        let target = self.units.get(self.target_unit?)?;
        let o = target.bbox();
        let e = self.mover.extents;
        Some(Rect::new(o.left - e.right, o.top - e.down, o.right + e.left, o.bottom + e.up))
    }
}

fn move_clear(edges: &[LocalEdge], a: Point, b: Point) -> bool {
    a == b || !edges.iter().any(|e| e.blocks(a, b))
}

/// Goal test and goal projection.
#[derive(Debug, Clone, Copy)]
enum Goal {
    Point(Point),
    /// Closed box; any point inside counts as arrived.
    Area(Rect),
}

impl Goal {
    fn nearest(self, p: Point) -> Point {
        match self {
            Self::Point(g) => g,
            Self::Area(r) => r.clamp_closed(p),
        }
    }

    fn contains(self, p: Point) -> bool {
        self.nearest(p) == p
    }
}

/// Columns already swept by vertical casts.
#[derive(Debug, Default)]
struct Coverage {
    bands: BTreeMap<i32, Vec<(i32, i32)>>,
    max_bands: usize,
    max_spans: usize,
}

impl Coverage {
    fn new(max_bands: usize, max_spans: usize) -> Self {
        Self {
            bands: BTreeMap::new(),
            max_bands,
            max_spans,
        }
    }

    fn covers(&self, p: Point) -> bool {
        self.bands
            .get(&p.x)
            .is_some_and(|spans| spans.iter().any(|&(lo, hi)| lo <= p.y && p.y <= hi))
    }

    fn record(&mut self, x: i32, a: i32, b: i32) {
        let (mut lo, mut hi) = (a.min(b), a.max(b));
        if !self.bands.contains_key(&x) && self.bands.len() >= self.max_bands {
            return;
        }
        let spans = self.bands.entry(x).or_default();
        spans.retain(|&(l, h)| {
            if l <= hi && lo <= h {
                lo = lo.min(l);
                hi = hi.max(h);
                false
            } else {
                true
            }
        });
        if spans.len() < self.max_spans {
            spans.push((lo, hi));
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    pos: Point,
    g: u32,
    h: u32,
    parent: Option<usize>,
    /// Cast directions still worth exploring from here.
    dirs: u8,
    closed: bool,
    in_goal_region: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f: u32,
    h: u32,
    node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.f, other.h, other.node).cmp(&(self.f, self.h, self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const ALL_DIRS: u8 = 0b1111;

struct Search<'s, 'a> {
    obstacles: &'s Obstacles<'a>,
    config: &'s NavConfig,
    goal: Goal,
    goal_region: Option<RegionId>,
    nodes: Vec<Node>,
    index: HashMap<Point, usize>,
    open: BinaryHeap<OpenEntry>,
    open_count: usize,
    coverage: Coverage,
    stats: SearchStats,
}

impl Search<'_, '_> {
    fn add(&mut self, pos: Point, parent: usize, dirs: u8) {
        let g = self.nodes[parent].g.saturating_add(self.nodes[parent].pos.distance(pos));
        if let Some(&i) = self.index.get(&pos) {
            let node = &mut self.nodes[i];
            if node.closed || node.g <= g {
                return;
            }
            node.g = g;
            node.parent = Some(parent);
            node.dirs |= dirs;
            let entry = OpenEntry {
                f: g.saturating_add(node.h),
                h: node.h,
                node: i,
            };
            self.open.push(entry);
            return;
        }
        if self.open_count >= self.config.short_open_limit {
            return;
        }
        let h = pos.distance(self.goal.nearest(pos));
        let in_goal_region =
            self.goal_region.is_some() && self.obstacles.map.region_at(pos) == self.goal_region;
        let i = self.nodes.len();
        self.nodes.push(Node {
            pos,
            g,
            h,
            parent: Some(parent),
            dirs,
            closed: false,
            in_goal_region,
        });
        self.index.insert(pos, i);
        self.open.push(OpenEntry {
            f: g.saturating_add(h),
            h,
            node: i,
        });
        self.open_count += 1;
        self.stats.generated += 1;
        self.stats.peak_open = self.stats.peak_open.max(self.open_count);
    }

    fn expand(&mut self, i: usize) -> Result<()> {
        let node = self.nodes[i];
        let half = self.config.short_window / 2;
        let window = Rect::around(node.pos, half);
        let edges = self.obstacles.gather(window.expand(1))?;

        for dir in Facing::ALL {
            if node.dirs & dir.bit() == 0 {
                continue;
            }
            let vertical = dir.is_horizontal_edge();
            let (candidates, reach) = cast(&edges, node.pos, dir, &window);
            let child_dirs = ALL_DIRS & !dir.opposite().bit();
            for c in candidates.into_iter().flatten() {
                if c == node.pos || (vertical && self.coverage.covers(c)) {
                    continue;
                }
                if move_clear(&edges, node.pos, c) {
                    self.add(c, i, child_dirs);
                }
            }
            if vertical {
                self.coverage.record(node.pos.x, node.pos.y, reach);
            }
        }

        let target = self.goal.nearest(node.pos);
        if target != node.pos
            && node.pos.distance(target) <= self.config.direct_reach.unsigned_abs()
            && self.obstacles.straight_move_clear(node.pos, target)?
        {
            self.add(target, i, ALL_DIRS);
        }
        Ok(())
    }

    fn best_effort(&self) -> usize {
        self.nodes
            .iter()
            .enumerate()
            .min_by_key(|(i, n)| (n.h, !n.in_goal_region, n.g, *i))
            .map_or(0, |(i, _)| i)
    }

    fn route_to(&self, end: usize) -> Vec<Point> {
        let mut route = Vec::new();
        let mut cursor = Some(end);
        while let Some(i) = cursor {
            route.push(self.nodes[i].pos);
            cursor = self.nodes[i].parent;
        }
        route.reverse();
        route
    }
}

/// Cast from `p` in `dir` inside `window`.
///
/// Returns up to two candidates and the coordinate where the ray stopped.
fn cast(edges: &[LocalEdge], p: Point, dir: Facing, window: &Rect) -> ([Option<Point>; 2], i32) {
    let blocking = dir.opposite();
    let forward = matches!(dir, Facing::Down | Facing::Right);
    let (along, across) = if dir.is_horizontal_edge() {
        (p.x, p.y)
    } else {
        (p.y, p.x)
    };
    let limit = match dir {
        Facing::Up => window.top,
        Facing::Down => window.bottom,
        Facing::Left => window.left,
        Facing::Right => window.right,
    };

    let hit = edges
        .iter()
        .filter(|e| e.facing == blocking && e.from < along && along < e.to)
        .filter(|e| {
            if forward {
                e.pos >= across && e.pos <= limit
            } else {
                e.pos <= across && e.pos >= limit
            }
        })
        .min_by_key(|e| ((e.pos - across).abs(), e.from, e.to));

    let make = |along: i32, across: i32| {
        if dir.is_horizontal_edge() {
            Point::new(along, across)
        } else {
            Point::new(across, along)
        }
    };
    let (lo, hi) = if dir.is_horizontal_edge() {
        (window.left, window.right)
    } else {
        (window.top, window.bottom)
    };

    match hit {
        Some(e) => (
            [
                Some(make(e.from.clamp(lo, hi), e.pos)),
                Some(make(e.to.clamp(lo, hi), e.pos)),
            ],
            e.pos,
        ),
        None => ([Some(make(along, limit)), None], limit),
    }
}

/// Plan a local path.
pub fn find_short_path(
    map: &GameMap,
    units: &UnitArena,
    finder: &UnitFinder,
    request: &ShortPathRequest,
    config: &NavConfig,
) -> Result<ShortPath> {
    let obstacles = Obstacles::new(
        map,
        units,
        finder,
        request.mover,
        request.target_unit,
        request.include_movers,
    )?
    .avoiding(request.avoid);
    let goal = obstacles
        .contact_area()
        .map_or(Goal::Point(request.goal), Goal::Area);

    if goal.contains(request.start) {
        return Ok(ShortPath {
            waypoints: Vec::new(),
            reached: true,
            stats: SearchStats::default(),
        });
    }

    let goal_region = map.region_at(goal.nearest(request.start));
    let start_h = request.start.distance(goal.nearest(request.start));
    let mut search = Search {
        obstacles: &obstacles,
        config,
        goal,
        goal_region,
        nodes: vec![Node {
            pos: request.start,
            g: 0,
            h: start_h,
            parent: None,
            dirs: ALL_DIRS,
            closed: false,
            in_goal_region: goal_region.is_some() && map.region_at(request.start) == goal_region,
        }],
        index: HashMap::from([(request.start, 0)]),
        open: BinaryHeap::from([OpenEntry {
            f: start_h,
            h: start_h,
            node: 0,
        }]),
        open_count: 1,
        coverage: Coverage::new(config.coverage_bands, config.coverage_spans),
        stats: SearchStats {
            generated: 1,
            peak_open: 1,
            ..SearchStats::default()
        },
    };

    let mut arrived = None;
    while let Some(entry) = search.open.pop() {
        let node = search.nodes[entry.node];
        if node.closed || entry.f != node.g.saturating_add(node.h) {
            continue;
        }
        search.open_count -= 1;
        if goal.contains(node.pos) {
            arrived = Some(entry.node);
            break;
        }
        if search.stats.expanded >= config.short_expand_limit {
            break;
        }
        search.nodes[entry.node].closed = true;
        search.stats.expanded += 1;
        search.expand(entry.node)?;
    }

    let reached = arrived.is_some();
    let end = arrived.unwrap_or_else(|| search.best_effort());
    let route = search.route_to(end);
    let stats = search.stats;

    let mut waypoints = smooth(&obstacles, &route)?;
    let mut reached = reached;
    if waypoints.len() > config.waypoint_cap {
        waypoints.truncate(config.waypoint_cap);
        reached = false;
    }

    tracing::trace!(
        expanded = stats.expanded,
        peak_open = stats.peak_open,
        waypoints = waypoints.len(),
        reached,
        "short path search"
    );

    Ok(ShortPath {
        waypoints,
        reached,
        stats,
    })
}

/// Drop waypoints that a straight move can skip. The start is not returned.
fn smooth(obstacles: &Obstacles<'_>, route: &[Point]) -> Result<Vec<Point>> {
    if route.len() <= 2 {
        return Ok(route.iter().skip(1).copied().collect());
    }
    let area = route
        .iter()
        .fold(Rect::spanning(route[0], route[0]), |acc, p| {
            acc.union(&Rect::spanning(*p, *p))
        });
    let edges = obstacles.gather(area.expand(1))?;

    let mut out = Vec::new();
    let mut anchor = 0;
    while anchor + 1 < route.len() {
        let mut next = anchor + 1;
        for j in (anchor + 2..route.len()).rev() {
            if move_clear(&edges, route[anchor], route[j]) {
                next = j;
                break;
            }
        }
        out.push(route[next]);
        anchor = next;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use crate::terrain::TileGrid;
    use crate::units::UnitSpec;

    struct World {
        map: GameMap,
        units: UnitArena,
        finder: UnitFinder,
    }

    impl World {
        fn new(rows: &[&str]) -> Self {
            let map = GameMap::from_tiles(TileGrid::from_rows(rows).unwrap(), 4).unwrap();
            Self {
                map,
                units: UnitArena::with_capacity(64),
                finder: UnitFinder::new(),
            }
        }

        fn spawn(&mut self, spec: UnitSpec) -> UnitId {
            let id = self.units.spawn(&spec).unwrap();
            let bbox = self.units.get(id).unwrap().bbox();
            self.finder.insert(id, bbox);
            id
        }

        fn search(&self, mover: UnitId, goal: Point) -> ShortPath {
            let start = self.units.get(mover).unwrap().position();
            let request = ShortPathRequest {
                mover,
                start,
                goal,
                target_unit: None,
                include_movers: false,
                avoid: None,
            };
            find_short_path(&self.map, &self.units, &self.finder, &request, &NavConfig::default())
                .unwrap()
        }
    }

    const OPEN: [&str; 8] = [
        "........", "........", "........", "........", "........", "........", "........",
        "........",
    ];

    fn walker(x: i32, y: i32) -> UnitSpec {
        UnitSpec::ground(Point::new(x, y), 8, Fixed::from_num(4))
    }

    #[test]
    fn test_edge_blocks_only_entering_moves() {
        let bbox = Rect::new(100, 100, 120, 120);
        let edges: Vec<_> = box_faces(&bbox)
            .iter()
            .map(|f| LocalEdge::inflate(f, Extents::square(8)))
            .collect();
        let blocked = |a: Point, b: Point| !move_clear(&edges, a, b);

        assert!(blocked(Point::new(110, 80), Point::new(110, 100)));
        assert!(blocked(Point::new(140, 110), Point::new(120, 110)));
        // Leaving an overlap is allowed.
        assert!(!blocked(Point::new(110, 100), Point::new(110, 80)));
        // Sliding along the inflated face.
        assert!(!blocked(Point::new(80, 92), Point::new(140, 92)));
        // Stopping exactly on the face.
        assert!(!blocked(Point::new(110, 60), Point::new(110, 92)));
        // Cutting through the inflated corner.
        assert!(blocked(Point::new(80, 80), Point::new(100, 100)));
        // Passing diagonally outside the corner.
        assert!(!blocked(Point::new(70, 100), Point::new(100, 70)));
    }

    #[test]
    fn test_direct_path_is_single_waypoint() {
        let mut world = World::new(&OPEN);
        let mover = world.spawn(walker(40, 40));
        let path = world.search(mover, Point::new(200, 40));
        assert!(path.reached);
        assert_eq!(path.waypoints, vec![Point::new(200, 40)]);
    }

    #[test]
    fn test_start_at_goal_is_empty() {
        let mut world = World::new(&OPEN);
        let mover = world.spawn(walker(40, 40));
        let path = world.search(mover, Point::new(40, 40));
        assert!(path.reached);
        assert!(path.waypoints.is_empty());
        assert_eq!(path.stats.expanded, 0);
    }

    #[test]
    fn test_detours_around_terrain() {
        let mut world = World::new(&[
            "........", "........", "...##...", "...##...", "...##...", "........", "........",
            "........",
        ]);
        let mover = world.spawn(walker(48, 112));
        let path = world.search(mover, Point::new(208, 112));
        assert!(path.reached);
        assert!(path.waypoints.len() >= 2);
        assert_eq!(path.waypoints.last(), Some(&Point::new(208, 112)));

        let ext = Extents::square(8);
        let mut prev = Point::new(48, 112);
        let edges = world
            .map
            .contours()
            .list(Facing::Up)
            .iter()
            .chain(world.map.contours().list(Facing::Down))
            .chain(world.map.contours().list(Facing::Left))
            .chain(world.map.contours().list(Facing::Right))
            .map(|s| LocalEdge::inflate(s, ext))
            .collect::<Vec<_>>();
        for &w in &path.waypoints {
            assert!(!world.map.rect_collides(&ext.bbox_at(w)), "{w:?} collides");
            assert!(move_clear(&edges, prev, w), "{prev:?} -> {w:?} crosses terrain");
            prev = w;
        }
    }

    #[test]
    fn test_enclosed_goal_stays_within_budget() {
        let mut world = World::new(&[
            "........", "..####..", "..#..#..", "..####..", "........", "........", "........",
            "........",
        ]);
        let mover = world.spawn(walker(16, 16));
        let path = world.search(mover, Point::new(112, 80));
        let config = NavConfig::default();
        assert!(!path.reached);
        assert!(path.stats.expanded <= config.short_expand_limit);
        assert!(path.stats.peak_open <= config.short_open_limit);
        assert!(path.waypoints.len() <= config.waypoint_cap);
    }

    #[test]
    fn test_target_unit_contact() {
        let mut world = World::new(&OPEN);
        let mover = world.spawn(walker(40, 40));
        let depot = world.spawn(UnitSpec::building(Rect::new(128, 128, 192, 192)));
        let request = ShortPathRequest {
            mover,
            start: Point::new(40, 40),
            goal: Point::new(160, 160),
            target_unit: Some(depot),
            include_movers: false,
            avoid: None,
        };
        let path =
            find_short_path(&world.map, &world.units, &world.finder, &request, &NavConfig::default())
                .unwrap();
        assert!(path.reached);
        let end = *path.waypoints.last().unwrap();
        let bbox = Extents::square(8).bbox_at(end);
        let target = Rect::new(128, 128, 192, 192);
        assert!(!bbox.overlaps(&target));
        assert!(bbox.expand(1).overlaps(&target));
    }

    #[test]
    fn test_moving_units_ignored_unless_requested() {
        let mut world = World::new(&OPEN);
        let mover = world.spawn(walker(40, 120));
        let other = world.spawn(walker(120, 120));
        world.units.get_mut(other).unwrap().movement.state = crate::movement::MovementState::FollowPath;

        let goal = Point::new(200, 120);
        let ignoring = world.search(mover, goal);
        assert_eq!(ignoring.waypoints, vec![goal]);

        let request = ShortPathRequest {
            mover,
            start: Point::new(40, 120),
            goal,
            target_unit: None,
            include_movers: true,
            avoid: None,
        };
        let avoiding =
            find_short_path(&world.map, &world.units, &world.finder, &request, &NavConfig::default())
                .unwrap();
        assert!(avoiding.reached);
        assert!(avoiding.waypoints.len() >= 2);

        let named = ShortPathRequest {
            include_movers: false,
            avoid: Some(other),
            ..request
        };
        let around =
            find_short_path(&world.map, &world.units, &world.finder, &named, &NavConfig::default())
                .unwrap();
        assert_eq!(around.waypoints, avoiding.waypoints);
    }

    #[test]
    fn test_coverage_merges_and_caps() {
        let mut coverage = Coverage::new(2, 2);
        coverage.record(10, 0, 20);
        coverage.record(10, 15, 40);
        assert!(coverage.covers(Point::new(10, 35)));
        assert_eq!(coverage.bands[&10].len(), 1);
        coverage.record(20, 0, 5);
        coverage.record(30, 0, 5);
        assert!(!coverage.covers(Point::new(30, 1)));
        coverage.record(10, 100, 110);
        coverage.record(10, 200, 210);
        assert!(!coverage.covers(Point::new(10, 205)));
    }
}
