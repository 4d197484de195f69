//! Error types for the movement resolver.
//!
//! Blocking, unreachable destinations and exhausted search budgets are not
//! errors: they surface as unit status flags. Everything in [`NavError`]
//! is a structural violation that aborts the current tick.

use thiserror::Error;

use crate::path::PathId;
use crate::units::UnitId;

/// Result type alias using [`NavError`].
pub type Result<T> = std::result::Result<T, NavError>;

/// Fatal errors raised by the movement resolver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavError {
    /// A handle to a unit that no longer exists was passed in by a caller.
    #[error("Unit not found: {0:?}")]
    UnitNotFound(UnitId),

    /// The unit arena has no free slots left.
    #[error("Unit arena is full (capacity {capacity})")]
    UnitCapacityExceeded {
        /// Arena capacity.
        capacity: usize,
    },

    /// The path pool has no free slots left.
    #[error("Path pool is full (capacity {capacity})")]
    PathCapacityExceeded {
        /// Pool capacity.
        capacity: usize,
    },

    /// A path handle was used after being freed.
    #[error("Path used after free: {0:?}")]
    StalePath(PathId),

    /// Nested unit finder queries went deeper than the supported depth.
    #[error("Unit finder query depth exceeded (max {max})")]
    QueryDepthExceeded {
        /// Maximum supported nesting depth.
        max: usize,
    },

    /// A unit finder entry was requested for a unit that was never inserted.
    #[error("Unit {0:?} is not in the unit finder")]
    NotIndexed(UnitId),

    /// Region or tile data handed over by the map loader is inconsistent.
    #[error("Invalid map data: {0}")]
    InvalidMap(String),

    /// Configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    ConfigParse(String),
}
