//! Tile walkability grid.
//!
//! The grid is the raw terrain the region graph and contour index are
//! derived from. It is static for the lifetime of a simulation.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::math::{Point, Rect};

/// Side of a square tile in pixels.
pub const TILE_SIZE: i32 = 32;

/// Terrain class of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileKind {
    /// Ground units may stand here.
    #[default]
    Walkable,
    /// Cliffs, water, doodads.
    Blocked,
}

impl TileKind {
    /// Returns true if this tile is walkable.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Walkable)
    }
}

/// Walkability grid in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<TileKind>,
}

impl TileGrid {
    /// Create a grid with every tile walkable.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "TileGrid width must be positive");
        assert!(height > 0, "TileGrid height must be positive");
        Self {
            width,
            height,
            tiles: vec![TileKind::Walkable; (width as usize) * (height as usize)],
        }
    }

    /// Parse rows of `.` (walkable) and `#` (blocked).
    ///
    /// # Example
    ///
    /// ```
    /// use rts_pathing::terrain::TileGrid;
    ///
    /// let grid = TileGrid::from_rows(&["..#", "..."]).unwrap();
    /// assert!(!grid.is_walkable(2, 0));
    /// ```
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.as_ref().chars().count());
        if width == 0 || height == 0 {
            return Err(NavError::InvalidMap("empty tile rows".into()));
        }

        let mut tiles = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(NavError::InvalidMap(format!(
                    "row {y} has {} tiles, expected {width}",
                    row.chars().count()
                )));
            }
            for c in row.chars() {
                tiles.push(match c {
                    '.' => TileKind::Walkable,
                    '#' => TileKind::Blocked,
                    other => {
                        return Err(NavError::InvalidMap(format!(
                            "unknown tile '{other}' in row {y}"
                        )))
                    }
                });
            }
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            tiles,
        })
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Map area in pixels.
    #[must_use]
    pub const fn pixel_bounds(&self) -> Rect {
        Rect::new(
            0,
            0,
            self.width as i32 * TILE_SIZE,
            self.height as i32 * TILE_SIZE,
        )
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Check if tile coordinates are within grid bounds.
    #[must_use]
    pub const fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Tile kind at coordinates, `None` when out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<TileKind> {
        self.in_bounds(x, y).then(|| self.tiles[self.index(x, y)])
    }

    /// Set a tile. Returns `false` if out of bounds.
    pub fn set(&mut self, x: u32, y: u32, kind: TileKind) -> bool {
        if self.in_bounds(x, y) {
            let i = self.index(x, y);
            self.tiles[i] = kind;
            true
        } else {
            false
        }
    }

    /// Block every tile inside a tile rectangle (clipped to the grid).
    pub fn block_area(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set(x, y, TileKind::Blocked);
            }
        }
    }

    /// Out-of-bounds tiles count as blocked.
    #[must_use]
    pub fn is_walkable(&self, x: u32, y: u32) -> bool {
        self.get(x, y).is_some_and(TileKind::is_walkable)
    }

    /// Signed variant of [`is_walkable`](Self::is_walkable).
    #[must_use]
    pub fn is_walkable_signed(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && self.is_walkable(x as u32, y as u32)
    }

    /// Tile containing a pixel, `None` outside the map.
    #[must_use]
    pub fn tile_at(&self, p: Point) -> Option<(u32, u32)> {
        if p.x < 0 || p.y < 0 {
            return None;
        }
        let (x, y) = ((p.x / TILE_SIZE) as u32, (p.y / TILE_SIZE) as u32);
        self.in_bounds(x, y).then_some((x, y))
    }

    /// Whether the pixel lies on walkable ground.
    #[must_use]
    pub fn is_walkable_at(&self, p: Point) -> bool {
        self.tile_at(p).is_some_and(|(x, y)| self.is_walkable(x, y))
    }

    /// Clamp a pixel into `[0, width_px - 1] × [0, height_px - 1]`.
    #[must_use]
    pub fn clamp_point(&self, p: Point) -> Point {
        let bounds = self.pixel_bounds();
        Point::new(
            p.x.clamp(0, bounds.right - 1),
            p.y.clamp(0, bounds.bottom - 1),
        )
    }

    /// Row-major tile slice.
    #[must_use]
    pub fn tiles(&self) -> &[TileKind] {
        &self.tiles
    }
}
