//! Interval index over unit bounding boxes.
//!
//! Every indexed unit contributes a min and a max endpoint to each of two
//! sorted arrays, one per axis. Moving a unit shifts its four endpoints to
//! their new sorted positions by adjacent swaps, which is cheap because
//! units move a few pixels per tick.
//!
//! Queries borrow the finder immutably and may be nested: a callback can
//! issue another query. Each nesting level owns one bit of a per-unit
//! visit mark so a unit is reported at most once per query; the bits are
//! cleared when the query returns.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{NavError, Result};
use crate::math::{Point, Rect};
use crate::units::UnitId;

/// Maximum nesting of queries issued from inside query callbacks.
pub const MAX_QUERY_DEPTH: usize = 8;

const FIRST_RING: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// One end of a unit's extent along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    coord: i32,
    slot: u32,
    is_max: bool,
}

impl Endpoint {
    fn key(self) -> (i32, bool, u32) {
        (self.coord, self.is_max, self.slot)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: UnitId,
    bbox: Rect,
    /// Array positions: x-min, x-max, y-min, y-max.
    pos: [usize; 4],
}

const fn back_index(axis: Axis, is_max: bool) -> usize {
    match (axis, is_max) {
        (Axis::X, false) => 0,
        (Axis::X, true) => 1,
        (Axis::Y, false) => 2,
        (Axis::Y, true) => 3,
    }
}

/// Sorted-endpoint spatial index.
#[derive(Debug, Default)]
pub struct UnitFinder {
    xs: Vec<Endpoint>,
    ys: Vec<Endpoint>,
    entries: Vec<Option<Entry>>,
    widths: BTreeMap<i32, u32>,
    heights: BTreeMap<i32, u32>,
    depth: Cell<usize>,
    marks: RefCell<Vec<u8>>,
}

impl UnitFinder {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.xs.len() / 2
    }

    /// True when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Whether `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.entry(id).is_some()
    }

    /// Indexed box of a unit.
    #[must_use]
    pub fn bbox(&self, id: UnitId) -> Option<Rect> {
        self.entry(id).map(|e| e.bbox)
    }

    /// Widest indexed box.
    #[must_use]
    pub fn max_width(&self) -> i32 {
        self.widths.keys().next_back().copied().unwrap_or(0)
    }

    /// Tallest indexed box.
    #[must_use]
    pub fn max_height(&self) -> i32 {
        self.heights.keys().next_back().copied().unwrap_or(0)
    }

    fn entry(&self, id: UnitId) -> Option<&Entry> {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .filter(|e| e.id == id)
    }

    /// Add a unit. An already indexed unit is moved instead.
    pub fn insert(&mut self, id: UnitId, bbox: Rect) {
        if let Some(old) = self.entry(id).map(|e| e.bbox) {
            // Present with the same generation: plain move.
            self.shift(id.index(), old, bbox);
            return;
        }
        let slot = id.index();
        if self.entries.len() <= slot {
            self.entries.resize(slot + 1, None);
            self.marks.get_mut().resize(slot + 1, 0);
        }
        // A stale entry for an older generation is dropped first.
        if self.entries[slot].is_some() {
            self.remove_slot(slot);
        }

        self.entries[slot] = Some(Entry {
            id,
            bbox,
            pos: [0; 4],
        });
        *self.widths.entry(bbox.width()).or_default() += 1;
        *self.heights.entry(bbox.height()).or_default() += 1;

        let slot = slot as u32;
        for (axis, coord, is_max) in [
            (Axis::X, bbox.left, false),
            (Axis::X, bbox.right, true),
            (Axis::Y, bbox.top, false),
            (Axis::Y, bbox.bottom, true),
        ] {
            let list = match axis {
                Axis::X => &mut self.xs,
                Axis::Y => &mut self.ys,
            };
            list.push(Endpoint { coord, slot, is_max });
            let at = list.len() - 1;
            if let Some(entry) = self.entries[slot as usize].as_mut() {
                entry.pos[back_index(axis, is_max)] = at;
            }
            self.bubble(axis, at);
        }
    }

    /// Remove a unit.
    pub fn remove(&mut self, id: UnitId) -> Result<()> {
        if !self.contains(id) {
            return Err(NavError::NotIndexed(id));
        }
        self.remove_slot(id.index());
        Ok(())
    }

    fn remove_slot(&mut self, slot: usize) {
        let Some(entry) = self.entries[slot].take() else {
            return;
        };
        release(&mut self.widths, entry.bbox.width());
        release(&mut self.heights, entry.bbox.height());

        for axis in [Axis::X, Axis::Y] {
            let list = match axis {
                Axis::X => &mut self.xs,
                Axis::Y => &mut self.ys,
            };
            list.retain(|e| e.slot as usize != slot);
            self.reindex(axis, 0);
        }
    }

    /// Move a unit's box, shifting its endpoints into place.
    pub fn reinsert(&mut self, id: UnitId, bbox: Rect) -> Result<()> {
        let old = self.entry(id).ok_or(NavError::NotIndexed(id))?.bbox;
        self.shift(id.index(), old, bbox);
        Ok(())
    }

    fn shift(&mut self, slot: usize, old: Rect, bbox: Rect) {
        if old == bbox {
            return;
        }
        if old.width() != bbox.width() {
            release(&mut self.widths, old.width());
            *self.widths.entry(bbox.width()).or_default() += 1;
        }
        if old.height() != bbox.height() {
            release(&mut self.heights, old.height());
            *self.heights.entry(bbox.height()).or_default() += 1;
        }

        let updates = [
            (Axis::X, false, bbox.left),
            (Axis::X, true, bbox.right),
            (Axis::Y, false, bbox.top),
            (Axis::Y, true, bbox.bottom),
        ];
        for (axis, is_max, coord) in updates {
            let Some(entry) = self.entries[slot].as_mut() else {
                return;
            };
            entry.bbox = bbox;
            let at = entry.pos[back_index(axis, is_max)];
            match axis {
                Axis::X => self.xs[at].coord = coord,
                Axis::Y => self.ys[at].coord = coord,
            }
            self.bubble(axis, at);
        }
    }

    /// Shift the endpoint at `at` left or right until its list is sorted.
    fn bubble(&mut self, axis: Axis, mut at: usize) {
        let list = match axis {
            Axis::X => &mut self.xs,
            Axis::Y => &mut self.ys,
        };
        while at > 0 && list[at - 1].key() > list[at].key() {
            list.swap(at - 1, at);
            at -= 1;
            fix_back_index(&mut self.entries, axis, list, at);
            fix_back_index(&mut self.entries, axis, list, at + 1);
        }
        while at + 1 < list.len() && list[at + 1].key() < list[at].key() {
            list.swap(at, at + 1);
            at += 1;
            fix_back_index(&mut self.entries, axis, list, at - 1);
            fix_back_index(&mut self.entries, axis, list, at);
        }
    }

    fn reindex(&mut self, axis: Axis, from: usize) {
        let list = match axis {
            Axis::X => &self.xs,
            Axis::Y => &self.ys,
        };
        for at in from..list.len() {
            fix_back_index(&mut self.entries, axis, list, at);
        }
    }

    fn enter(&self) -> Result<QueryGuard<'_>> {
        let depth = self.depth.get();
        if depth >= MAX_QUERY_DEPTH {
            return Err(NavError::QueryDepthExceeded {
                max: MAX_QUERY_DEPTH,
            });
        }
        self.depth.set(depth + 1);
        Ok(QueryGuard {
            finder: self,
            bit: 1 << depth,
            marked: Vec::new(),
        })
    }

    /// Call `f` for every unit whose box overlaps `rect`, in endpoint order.
    ///
    /// `f` returns `Ok(false)` to stop early. It may issue nested queries.
    pub fn for_each_in_rect<F>(&self, rect: Rect, mut f: F) -> Result<()>
    where
        F: FnMut(UnitId, Rect) -> Result<bool>,
    {
        let mut guard = self.enter()?;
        if rect.is_empty() {
            return Ok(());
        }

        // Scan whichever axis has fewer endpoints in range.
        let x_range = min_range(&self.xs, rect.left - self.max_width(), rect.right);
        let y_range = min_range(&self.ys, rect.top - self.max_height(), rect.bottom);
        let (list, range) = if x_range.len() <= y_range.len() {
            (&self.xs, x_range)
        } else {
            (&self.ys, y_range)
        };

        for at in range {
            let ep = list[at];
            if ep.is_max {
                continue;
            }
            let Some(entry) = self.entries[ep.slot as usize] else {
                continue;
            };
            if !entry.bbox.overlaps(&rect) || !guard.mark(ep.slot) {
                continue;
            }
            if !f(entry.id, entry.bbox)? {
                break;
            }
        }
        Ok(())
    }

    /// Units whose box overlaps `rect`, in endpoint order.
    pub fn units_in_rect(&self, rect: Rect) -> Result<Vec<UnitId>> {
        let mut out = Vec::new();
        self.for_each_in_rect(rect, |id, _| {
            out.push(id);
            Ok(true)
        })?;
        Ok(out)
    }

    /// Closest unit to `point` accepted by `predicate`, within `max_radius`.
    ///
    /// Distance is measured to the nearest pixel of the box. The search
    /// widens a square ring around `point` until a match is provably the
    /// nearest or the radius is exhausted. Ties go to the lower handle.
    pub fn nearest<P>(&self, point: Point, max_radius: i32, mut predicate: P) -> Result<Option<UnitId>>
    where
        P: FnMut(UnitId, Rect) -> bool,
    {
        let mut guard = self.enter()?;
        let mut best: Option<(u64, UnitId)> = None;
        let mut radius = FIRST_RING.min(max_radius.max(0));
        let limit = u64::from(max_radius.max(0).unsigned_abs()).pow(2);

        loop {
            let ring = Rect::around(point, radius).expand(1);
            let x_range = min_range(&self.xs, ring.left - self.max_width(), ring.right);
            for at in x_range {
                let ep = self.xs[at];
                if ep.is_max {
                    continue;
                }
                let Some(entry) = self.entries[ep.slot as usize] else {
                    continue;
                };
                if !entry.bbox.overlaps(&ring) || !guard.mark(ep.slot) {
                    continue;
                }
                let d = box_distance_squared(&entry.bbox, point);
                if d > limit || !predicate(entry.id, entry.bbox) {
                    continue;
                }
                if best.map_or(true, |(bd, bid)| (d, entry.id) < (bd, bid)) {
                    best = Some((d, entry.id));
                }
            }

            let r2 = u64::from(radius.unsigned_abs()).pow(2);
            if best.is_some_and(|(d, _)| d <= r2) || radius >= max_radius {
                return Ok(best.map(|(_, id)| id));
            }
            radius = (radius * 2).min(max_radius);
        }
    }

    /// Current query nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}

/// Releases the depth level and clears its visit bits.
struct QueryGuard<'a> {
    finder: &'a UnitFinder,
    bit: u8,
    marked: Vec<u32>,
}

impl QueryGuard<'_> {
    /// Mark a slot; false if it was already reported by this query.
    fn mark(&mut self, slot: u32) -> bool {
        let mut marks = self.finder.marks.borrow_mut();
        let Some(m) = marks.get_mut(slot as usize) else {
            return false;
        };
        if *m & self.bit != 0 {
            return false;
        }
        *m |= self.bit;
        self.marked.push(slot);
        true
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        let mut marks = self.finder.marks.borrow_mut();
        for &slot in &self.marked {
            if let Some(m) = marks.get_mut(slot as usize) {
                *m &= !self.bit;
            }
        }
        self.finder.depth.set(self.finder.depth.get() - 1);
    }
}

fn fix_back_index(entries: &mut [Option<Entry>], axis: Axis, list: &[Endpoint], at: usize) {
    let ep = list[at];
    if let Some(entry) = entries[ep.slot as usize].as_mut() {
        entry.pos[back_index(axis, ep.is_max)] = at;
    }
}

fn release(sizes: &mut BTreeMap<i32, u32>, size: i32) {
    if let Some(count) = sizes.get_mut(&size) {
        *count -= 1;
        if *count == 0 {
            sizes.remove(&size);
        }
    }
}

/// Endpoint positions whose coordinate lies in `[lo, hi)`.
fn min_range(list: &[Endpoint], lo: i32, hi: i32) -> std::ops::Range<usize> {
    let start = list.partition_point(|e| e.coord < lo);
    let end = list.partition_point(|e| e.coord < hi);
    start..end.max(start)
}

/// Squared distance from `p` to the nearest pixel of `rect`.
fn box_distance_squared(rect: &Rect, p: Point) -> u64 {
    let nearest = Point::new(
        p.x.clamp(rect.left, rect.right - 1),
        p.y.clamp(rect.top, rect.bottom - 1),
    );
    nearest.distance_squared(p)
}
