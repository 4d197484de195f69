//! Run reports.
//!
//! A [`RunReport`] summarizes one scenario run: where every unit ended up,
//! when it arrived or gave up, and how much search work the run cost.
//! Reports are saved as pretty JSON.

use std::path::Path;

use rts_pathing::movement::MovementState;
use rts_pathing::simulation::{TickEvents, UnitStatus};
use serde::{Deserialize, Serialize};

/// Final state of one scenario unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Index in the scenario.
    pub index: usize,
    /// Final movement state.
    pub state: MovementState,
    /// Final pixel position.
    pub position: (i32, i32),
    /// Reached its last destination.
    pub at_target: bool,
    /// Gave up on its last destination.
    pub immovable: bool,
    /// Tick at which it last arrived.
    pub arrived_tick: Option<u64>,
    /// Tick at which it last gave up.
    pub stuck_tick: Option<u64>,
    /// Ticks in which it moved.
    pub ticks_moving: u64,
    /// Ticks in which a collision was detected.
    pub ticks_collided: u64,
}

impl UnitReport {
    /// Empty report for scenario unit `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: MovementState::Init,
            position: (0, 0),
            at_target: false,
            immovable: false,
            arrived_tick: None,
            stuck_tick: None,
            ticks_moving: 0,
            ticks_collided: 0,
        }
    }

    /// Copy the readable status bits.
    pub fn record_status(&mut self, status: &UnitStatus) {
        self.state = status.state;
        self.position = (status.position.x, status.position.y);
        self.at_target = status.at_target;
        self.immovable = status.immovable;
        if status.collided {
            self.ticks_collided += 1;
        }
    }
}

/// Search work summed over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTotals {
    /// Long searches run.
    pub long_searches: u64,
    /// Short searches run.
    pub short_searches: u64,
    /// Regions expanded.
    pub long_expanded: u64,
    /// Short-search nodes expanded.
    pub short_expanded: u64,
    /// Most short searches in a single tick.
    pub peak_short_searches_per_tick: u64,
    /// Largest expansion count of any single short search.
    pub max_short_expanded: u64,
    /// Largest open list of any single short search.
    pub max_short_open: u64,
}

impl SearchTotals {
    /// Fold in one tick's counters.
    pub fn record(&mut self, events: &TickEvents) {
        let c = &events.searches;
        self.long_searches += c.long_searches as u64;
        self.short_searches += c.short_searches as u64;
        self.long_expanded += c.long_expanded as u64;
        self.short_expanded += c.short_expanded as u64;
        self.peak_short_searches_per_tick = self
            .peak_short_searches_per_tick
            .max(c.short_searches as u64);
        self.max_short_expanded = self.max_short_expanded.max(c.max_short_expanded as u64);
        self.max_short_open = self.max_short_open.max(c.max_short_open as u64);
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Every unit settled before the tick limit.
    pub settled: bool,
    /// Final state hash.
    pub final_state_hash: u64,
    /// Per-unit outcome.
    pub units: Vec<UnitReport>,
    /// Search work.
    pub searches: SearchTotals,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
}

impl RunReport {
    /// Units at their destination.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.units.iter().filter(|u| u.at_target).count()
    }

    /// Units that gave up.
    #[must_use]
    pub fn stuck(&self) -> usize {
        self.units.iter().filter(|u| u.immovable).count()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} ticks, {}/{} arrived, {} stuck, {} short / {} long searches, hash {:016x}",
            self.scenario,
            self.ticks,
            self.arrived(),
            self.units.len(),
            self.stuck(),
            self.searches.short_searches,
            self.searches.long_searches,
            self.final_state_hash
        )
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load from JSON.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}
