//! Terrain contour index.
//!
//! Every boundary between a walkable and a blocked tile (the map border
//! counts as blocked outside) becomes part of a directional segment. The
//! segments are split into four lists by the side the free space lies on,
//! and each list is sorted by `(pos, from)` so sweeps can binary-search the
//! fixed coordinate.

use serde::{Deserialize, Serialize};

use crate::math::Rect;
use crate::terrain::{TileGrid, TILE_SIZE};

/// Compass direction; for contours, the side where the free space lies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Facing {
    /// Toward smaller y.
    Up,
    /// Toward larger y.
    Down,
    /// Toward smaller x.
    Left,
    /// Toward larger x.
    Right,
}

impl Facing {
    /// All four directions in list order.
    pub const ALL: [Facing; 4] = [Facing::Up, Facing::Down, Facing::Left, Facing::Right];

    /// Index into per-direction tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Left => 2,
            Self::Right => 3,
        }
    }

    /// Reverse direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// True for `Up`/`Down`, whose segments run along x at a fixed y.
    #[must_use]
    pub const fn is_horizontal_edge(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }

    /// Single-bit mask for direction sets.
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// One run of terrain boundary.
///
/// For `Up`/`Down` the segment lies on the line `y = pos` and covers
/// `x ∈ [from, to)`; for `Left`/`Right` it lies on `x = pos` and covers
/// `y ∈ [from, to)`. Blocked ground is on the side opposite `facing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContourSegment {
    /// Coordinate on the fixed axis.
    pub pos: i32,
    /// Start of the run (inclusive).
    pub from: i32,
    /// End of the run (exclusive).
    pub to: i32,
    /// Side of the free space.
    pub facing: Facing,
}

/// Four sorted lists of terrain boundary segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContourIndex {
    lists: [Vec<ContourSegment>; 4],
}

impl ContourIndex {
    /// Extract every walkable/blocked boundary from the grid, map border included.
    #[must_use]
    pub fn build(grid: &TileGrid) -> Self {
        let (w, h) = (grid.width() as i32, grid.height() as i32);
        let mut lists: [Vec<ContourSegment>; 4] = Default::default();

        // Horizontal boundaries: line y = ty * TILE_SIZE between rows ty-1 and ty.
        for ty in 0..=h {
            let mut run: Option<(Facing, i32)> = None;
            for tx in 0..=w {
                let facing = if tx == w {
                    None
                } else {
                    let above = grid.is_walkable_signed(tx, ty - 1);
                    let below = grid.is_walkable_signed(tx, ty);
                    match (above, below) {
                        (true, false) => Some(Facing::Up),
                        (false, true) => Some(Facing::Down),
                        _ => None,
                    }
                };
                run = flush_run(&mut lists, run, facing, tx, ty);
            }
        }

        // Vertical boundaries: line x = tx * TILE_SIZE between columns tx-1 and tx.
        for tx in 0..=w {
            let mut run: Option<(Facing, i32)> = None;
            for ty in 0..=h {
                let facing = if ty == h {
                    None
                } else {
                    let left = grid.is_walkable_signed(tx - 1, ty);
                    let right = grid.is_walkable_signed(tx, ty);
                    match (left, right) {
                        (true, false) => Some(Facing::Left),
                        (false, true) => Some(Facing::Right),
                        _ => None,
                    }
                };
                run = flush_run(&mut lists, run, facing, ty, tx);
            }
        }

        for list in &mut lists {
            list.sort_unstable_by_key(|s| (s.pos, s.from));
        }
        Self { lists }
    }

    /// Sorted segments of one facing.
    #[must_use]
    pub fn list(&self, facing: Facing) -> &[ContourSegment] {
        &self.lists[facing.index()]
    }

    /// Total segment count over all four lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// True when the map has no boundaries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Segments of `facing` with `pos ∈ [pos_lo, pos_hi]` whose run overlaps `[span_lo, span_hi)`.
    pub fn segments_between(
        &self,
        facing: Facing,
        pos_lo: i32,
        pos_hi: i32,
        span_lo: i32,
        span_hi: i32,
    ) -> impl Iterator<Item = &ContourSegment> + '_ {
        let list = self.list(facing);
        let start = list.partition_point(|s| s.pos < pos_lo);
        let end = list.partition_point(|s| s.pos <= pos_hi);
        list[start..end.max(start)]
            .iter()
            .filter(move |s| s.from < span_hi && s.to > span_lo)
    }

    /// Segments of `facing` touching a rectangle, edges on its border included.
    pub fn segments_in(&self, facing: Facing, rect: Rect) -> impl Iterator<Item = &ContourSegment> + '_ {
        if facing.is_horizontal_edge() {
            self.segments_between(facing, rect.top, rect.bottom, rect.left, rect.right)
        } else {
            self.segments_between(facing, rect.left, rect.right, rect.top, rect.bottom)
        }
    }

    /// True when some boundary passes through the interior of `rect`.
    ///
    /// A rectangle no boundary crosses is uniformly walkable or uniformly
    /// blocked; the caller decides which with a single point test.
    #[must_use]
    pub fn crosses(&self, rect: &Rect) -> bool {
        if rect.is_empty() {
            return false;
        }
        Facing::ALL.iter().any(|&facing| {
            if facing.is_horizontal_edge() {
                self.segments_between(facing, rect.top + 1, rect.bottom - 1, rect.left, rect.right)
                    .next()
                    .is_some()
            } else {
                self.segments_between(facing, rect.left + 1, rect.right - 1, rect.top, rect.bottom)
                    .next()
                    .is_some()
            }
        })
    }
}

/// Extend or close the current run along one boundary line.
fn flush_run(
    lists: &mut [Vec<ContourSegment>; 4],
    run: Option<(Facing, i32)>,
    facing: Option<Facing>,
    step: i32,
    line: i32,
) -> Option<(Facing, i32)> {
    match (run, facing) {
        (Some((current, start)), next) if next != Some(current) => {
            lists[current.index()].push(ContourSegment {
                pos: line * TILE_SIZE,
                from: start * TILE_SIZE,
                to: step * TILE_SIZE,
                facing: current,
            });
            next.map(|f| (f, step))
        }
        (None, Some(f)) => Some((f, step)),
        (run, _) => run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point;

    #[test]
    fn test_open_map_has_only_border() {
        let index = ContourIndex::build(&TileGrid::new(4, 3));
        assert_eq!(index.len(), 4);
        assert_eq!(
            index.list(Facing::Down)[0],
            ContourSegment {
                pos: 0,
                from: 0,
                to: 128,
                facing: Facing::Down
            }
        );
        assert_eq!(index.list(Facing::Up)[0].pos, 96);
        assert_eq!(index.list(Facing::Right)[0].pos, 0);
        assert_eq!(index.list(Facing::Left)[0].pos, 128);
    }

    #[test]
    fn test_single_block_has_four_faces() {
        let mut grid = TileGrid::new(5, 5);
        grid.block_area(2, 2, 3, 3);
        let index = ContourIndex::build(&grid);
        assert_eq!(index.len(), 8);

        let top: Vec<_> = index.segments_in(Facing::Up, Rect::new(0, 60, 160, 70)).collect();
        assert_eq!(top.len(), 1);
        assert_eq!((top[0].pos, top[0].from, top[0].to), (64, 64, 96));
    }

    #[test]
    fn test_runs_merge_along_wall() {
        let mut grid = TileGrid::new(6, 6);
        grid.block_area(1, 3, 5, 4);
        let index = ContourIndex::build(&grid);
        let tops: Vec<_> = index.list(Facing::Up).iter().filter(|s| s.pos == 96).collect();
        assert_eq!(tops.len(), 1);
        assert_eq!((tops[0].from, tops[0].to), (32, 160));
    }

    #[test]
    fn test_lists_are_sorted() {
        let grid = TileGrid::from_rows(&["#.#.", "....", ".#.#", "...."]).unwrap();
        let index = ContourIndex::build(&grid);
        for facing in Facing::ALL {
            let list = index.list(facing);
            assert!(list.windows(2).all(|w| (w[0].pos, w[0].from) <= (w[1].pos, w[1].from)));
        }
    }

    #[test]
    fn test_crosses_interior_only() {
        let mut grid = TileGrid::new(5, 5);
        grid.block_area(2, 2, 3, 3);
        let index = ContourIndex::build(&grid);
        // Box touching the block's top edge from above: boundary on its border only.
        assert!(!index.crosses(&Rect::new(64, 40, 96, 64)));
        // One pixel deeper crosses.
        assert!(index.crosses(&Rect::new(64, 40, 96, 65)));
        // Fully inside the block: nothing crosses, the point test decides.
        assert!(!index.crosses(&Rect::around(Point::new(80, 80), 4)));
    }
}
