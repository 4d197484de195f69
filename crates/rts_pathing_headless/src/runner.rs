//! Scenario runner.
//!
//! Drives a [`Scenario`] tick by tick: issues scheduled orders, advances
//! the simulation and folds every tick into a [`RunReport`].

use std::time::Instant;

use rts_pathing::simulation::{Simulation, TickEvents};

use crate::report::{RunReport, SearchTotals, UnitReport};
use crate::scenario::{LoadedScenario, Scenario, ScenarioError};

/// Runner configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Hard tick limit.
    pub max_ticks: u64,
    /// Stop early once every order is issued and no unit is moving.
    pub stop_when_settled: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ticks: 600,
            stop_when_settled: true,
        }
    }
}

/// Runs one scenario.
#[derive(Debug)]
pub struct ScenarioRunner {
    name: String,
    loaded: LoadedScenario,
    units: Vec<UnitReport>,
    searches: SearchTotals,
    config: RunConfig,
}

impl ScenarioRunner {
    /// Instantiate `scenario`.
    pub fn new(scenario: &Scenario, config: RunConfig) -> Result<Self, ScenarioError> {
        let loaded = scenario.instantiate()?;
        let units = (0..loaded.units.len()).map(UnitReport::new).collect();
        Ok(Self {
            name: scenario.name.clone(),
            loaded,
            units,
            searches: SearchTotals::default(),
            config,
        })
    }

    /// The simulation being driven.
    #[must_use]
    pub fn sim(&self) -> &Simulation {
        &self.loaded.sim
    }

    /// Issue due orders and advance one tick.
    pub fn step(&mut self) -> Result<TickEvents, ScenarioError> {
        self.loaded.issue_due_orders()?;
        let events = self.loaded.sim.tick()?;
        let tick = self.loaded.sim.get_tick();

        for (index, &id) in self.loaded.units.iter().enumerate() {
            let report = &mut self.units[index];
            // Removed units keep their last report.
            let Ok(status) = self.loaded.sim.status(id) else {
                continue;
            };
            report.record_status(&status);
            if events.moved.contains(&id) {
                report.ticks_moving += 1;
            }
            if events.arrived.contains(&id) {
                report.arrived_tick = Some(tick);
            }
            if events.stuck.contains(&id) {
                report.stuck_tick = Some(tick);
            }
        }
        self.searches.record(&events);
        Ok(events)
    }

    /// Every order has been issued and no unit is in motion.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let sim = &self.loaded.sim;
        sim.get_tick() > self.loaded.last_order_tick()
            && sim
                .units()
                .all(|u| !u.movement.state.is_in_motion())
    }

    /// Run to completion, calling `on_tick` after every tick.
    pub fn run_with<F>(mut self, mut on_tick: F) -> Result<RunReport, ScenarioError>
    where
        F: FnMut(&Self, &TickEvents),
    {
        let start = Instant::now();
        let mut settled = false;
        while self.loaded.sim.get_tick() < self.config.max_ticks {
            let events = self.step()?;
            on_tick(&self, &events);
            if self.config.stop_when_settled && self.is_settled() {
                settled = true;
                break;
            }
        }

        let report = RunReport {
            scenario: self.name,
            ticks: self.loaded.sim.get_tick(),
            settled,
            final_state_hash: self.loaded.sim.state_hash(),
            units: self.units,
            searches: self.searches,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        tracing::info!(
            scenario = %report.scenario,
            ticks = report.ticks,
            arrived = report.arrived(),
            stuck = report.stuck(),
            settled = report.settled,
            "Scenario finished"
        );
        Ok(report)
    }

    /// Run to completion.
    pub fn run(self) -> Result<RunReport, ScenarioError> {
        self.run_with(|_, _| {})
    }
}

/// Instantiate and run `scenario`.
pub fn run_scenario(scenario: &Scenario, config: RunConfig) -> Result<RunReport, ScenarioError> {
    ScenarioRunner::new(scenario, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_on_settles() {
        let report = run_scenario(&Scenario::head_on(), RunConfig::default()).unwrap();
        assert!(report.settled);
        assert!(report.ticks < 600);
        assert_eq!(report.units.len(), 2);
        assert_eq!(report.arrived() + report.stuck(), 2);
    }

    #[test]
    fn test_detour_arrives() {
        let report = run_scenario(&Scenario::detour(), RunConfig::default()).unwrap();
        let walker = &report.units[1];
        assert!(walker.at_target);
        assert_eq!(walker.position, (420, 192));
        assert!(walker.arrived_tick.is_some());
        assert!(walker.ticks_moving > 0);
        assert!(report.searches.short_searches > 0);
    }

    #[test]
    fn test_tick_limit_is_respected() {
        let config = RunConfig {
            max_ticks: 5,
            stop_when_settled: false,
        };
        let mut ticks = 0;
        let report = ScenarioRunner::new(&Scenario::crowd(32), config)
            .unwrap()
            .run_with(|_, _| ticks += 1)
            .unwrap();
        assert_eq!(report.ticks, 5);
        assert_eq!(ticks, 5);
        assert!(!report.settled);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let a = run_scenario(&Scenario::head_on(), RunConfig::default()).unwrap();
        let b = run_scenario(&Scenario::head_on(), RunConfig::default()).unwrap();
        assert_eq!(a.final_state_hash, b.final_state_hash);
        assert_eq!(a.units, b.units);
    }
}
