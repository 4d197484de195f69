//! Static map geometry consumed by the resolver.

use serde::{Deserialize, Serialize};

use crate::contours::ContourIndex;
use crate::error::{NavError, Result};
use crate::math::{Point, Rect};
use crate::regions::{RegionGraph, RegionId};
use crate::terrain::TileGrid;

/// Tiles, regions and contours of one map. Immutable during simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameMap {
    tiles: TileGrid,
    regions: RegionGraph,
    contours: ContourIndex,
}

impl GameMap {
    /// Derive regions and contours from a tile grid.
    pub fn from_tiles(tiles: TileGrid, region_tiles: u32) -> Result<Self> {
        let regions = RegionGraph::from_tiles(&tiles, region_tiles)?;
        Self::with_regions(tiles, regions)
    }

    /// Pair a tile grid with an externally built region graph.
    pub fn with_regions(tiles: TileGrid, regions: RegionGraph) -> Result<Self> {
        let sample = Point::new(
            tiles.pixel_bounds().right - 1,
            tiles.pixel_bounds().bottom - 1,
        );
        if regions.region_at(sample).is_none() {
            return Err(NavError::InvalidMap(
                "region graph does not cover the tile grid".into(),
            ));
        }
        let contours = ContourIndex::build(&tiles);
        Ok(Self {
            tiles,
            regions,
            contours,
        })
    }

    /// Walkability grid.
    #[must_use]
    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    /// Region graph.
    #[must_use]
    pub fn regions(&self) -> &RegionGraph {
        &self.regions
    }

    /// Contour index.
    #[must_use]
    pub fn contours(&self) -> &ContourIndex {
        &self.contours
    }

    /// Map area in pixels.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.tiles.pixel_bounds()
    }

    /// Region under a pixel.
    #[must_use]
    pub fn region_at(&self, p: Point) -> Option<RegionId> {
        self.regions.region_at(p)
    }

    /// True when the box leaves the map or overlaps blocked terrain.
    #[must_use]
    pub fn rect_collides(&self, rect: &Rect) -> bool {
        if rect.is_empty() {
            return !self.bounds().contains(Point::new(rect.left, rect.top));
        }
        if !self.bounds().contains_rect(rect) {
            return true;
        }
        if self.contours.crosses(rect) {
            return true;
        }
        !self.tiles.is_walkable_at(Point::new(rect.left, rect.top))
    }

    /// Largest expansion of `bbox` (halving from `reach`) free of terrain.
    ///
    /// Returns `None` when `bbox` itself collides.
    #[must_use]
    pub fn no_collision_box(&self, bbox: &Rect, reach: i32) -> Option<Rect> {
        let mut r = reach;
        while r > 0 {
            let candidate = bbox.expand(r);
            if !self.rect_collides(&candidate) {
                return Some(candidate);
            }
            r /= 2;
        }
        (!self.rect_collides(bbox)).then_some(*bbox)
    }
}
