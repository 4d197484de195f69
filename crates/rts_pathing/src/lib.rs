//! # RTS Pathing
//!
//! Deterministic movement and pathfinding resolver for a tile-based
//! real-time strategy simulation.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Given unit geometry, map geometry and move orders it produces, tick by
//! tick, new positions and headings plus a small set of status flags.
//!
//! ## Crate Structure
//!
//! - [`terrain`], [`regions`], [`contours`], [`map`] - static map geometry
//! - [`units`], [`unit_finder`] - unit storage and the interval spatial index
//! - [`long_path`] - region-level A*
//! - [`short_path`] - local A* over terrain contours and unit boxes
//! - [`path`] - pooled per-unit paths
//! - [`movement`] - the per-unit movement state machine
//! - [`simulation`] - the fixed-timestep driver
//! - [`math`] - fixed-point and integer geometry

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod contours;
pub mod error;
pub mod long_path;
pub mod map;
pub mod math;
pub mod movement;
pub mod path;
pub mod regions;
pub mod short_path;
pub mod simulation;
pub mod terrain;
pub mod unit_finder;
pub mod units;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::NavConfig;
    pub use crate::error::{NavError, Result};
    pub use crate::map::GameMap;
    pub use crate::math::{Fixed, Heading, Point, Rect, Vec2Fixed};
    pub use crate::movement::{CollisionStrategy, MovementState};
    pub use crate::simulation::{MoveOrder, Simulation, TickEvents, UnitStatus};
    pub use crate::terrain::{TileGrid, TileKind, TILE_SIZE};
    pub use crate::units::{Extents, UnitFlags, UnitId, UnitSpec};
}
