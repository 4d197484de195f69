//! Tunables for the movement resolver.
//!
//! Every field has a default, so a RON file only needs to name the values
//! it overrides:
//!
//! ```ron
//! NavConfig(
//!     short_expand_limit: 400,
//!     max_collision_retries: 20,
//! )
//! ```
//!
//! **Note:** This module contains no IO. Reading files is left to the
//! caller (see `rts_pathing_headless`).

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};

/// Search budgets and collision-resolution thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Largest region rectangle side, in tiles, when building regions from tiles.
    pub region_tiles: u32,

    /// Long search: open-list capacity.
    pub long_open_limit: usize,
    /// Long search: maximum expanded regions.
    pub long_expand_limit: usize,
    /// Maximum regions kept in a corridor.
    pub corridor_cap: usize,

    /// Short search: open-list capacity.
    pub short_open_limit: usize,
    /// Short search: maximum expanded nodes.
    pub short_expand_limit: usize,
    /// Maximum waypoints kept in a short path.
    pub waypoint_cap: usize,
    /// Side of the square edge window inspected per expansion, in pixels.
    pub short_window: i32,
    /// Longest straight move tested for a direct goal connection, in pixels.
    pub direct_reach: i32,
    /// Coverage map: maximum X-bands.
    pub coverage_bands: usize,
    /// Coverage map: maximum Y-spans per band.
    pub coverage_spans: usize,

    /// Corridor reuse requires at least this many regions left to walk.
    pub reuse_corridor_min_legs: usize,
    /// Paths older than this many ticks are recomputed at the next leg.
    pub stale_path_ticks: u64,

    /// Failed collision resolutions before a unit is marked immovable.
    pub max_collision_retries: u8,
    /// Ticks to wait on a moving blocker before trying something else.
    pub wait_ticks: u8,
    /// A resting blocker idle for this many ticks is treated as permanent.
    pub idle_blocker_ticks: u32,
    /// Ticks spent sliding sideways before resuming the path.
    pub slide_ticks: u8,
    /// Ticks spent forcing through a blocker.
    pub force_ticks: u8,
    /// Speed divisor applied while forcing through.
    pub force_speed_divisor: i32,

    /// Search radius for the nearest legal position, in pixels.
    pub legal_search_radius: i32,
    /// Ticks to wait for a moving unit to leave before nudging out.
    pub legal_wait_ticks: u8,

    /// Initial half-size of the per-unit no-collision cache box, in pixels.
    pub no_collision_reach: i32,
    /// Transitions allowed within one tick for one unit.
    pub max_transitions_per_tick: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            region_tiles: 4,
            long_open_limit: 125,
            long_expand_limit: 350,
            corridor_cap: 50,
            short_open_limit: 150,
            short_expand_limit: 250,
            waypoint_cap: 50,
            short_window: 128,
            direct_reach: 256,
            coverage_bands: 128,
            coverage_spans: 10,
            reuse_corridor_min_legs: 4,
            stale_path_ticks: 240,
            max_collision_retries: 12,
            wait_ticks: 4,
            idle_blocker_ticks: 24,
            slide_ticks: 6,
            force_ticks: 6,
            force_speed_divisor: 2,
            legal_search_radius: 160,
            legal_wait_ticks: 8,
            no_collision_reach: 32,
            max_transitions_per_tick: 8,
        }
    }
}

impl NavConfig {
    /// Parse a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| NavError::ConfigParse(e.to_string()))
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| NavError::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = NavConfig::default();
        assert_eq!(config.long_open_limit, 125);
        assert_eq!(config.long_expand_limit, 350);
        assert_eq!(config.short_open_limit, 150);
        assert_eq!(config.short_expand_limit, 250);
        assert_eq!(config.corridor_cap, 50);
        assert_eq!(config.waypoint_cap, 50);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = NavConfig::from_ron_str("(max_collision_retries: 3)").unwrap();
        assert_eq!(config.max_collision_retries, 3);
        assert_eq!(config.short_window, 128);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = NavConfig {
            wait_ticks: 9,
            ..Default::default()
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(NavConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_ron_is_error() {
        assert!(matches!(
            NavConfig::from_ron_str("(wait_ticks: \"soon\")"),
            Err(NavError::ConfigParse(_))
        ));
    }
}
