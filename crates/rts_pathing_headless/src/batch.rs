//! Parallel scenario runs.
//!
//! Runs the same scenario many times in parallel using rayon and checks
//! that every run ends on the same state hash, and times large crowds.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::report::SearchTotals;
use crate::runner::{run_scenario, RunConfig};
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a determinism check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Number of runs.
    pub runs: u32,
    /// Ticks per run.
    pub ticks: u64,
    /// Maximum parallel runs (0 = use rayon default)
    pub parallel: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            runs: 5,
            ticks: 600,
            parallel: 0,
        }
    }
}

/// Outcome of a determinism check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Scenario name.
    pub scenario: String,
    /// Ticks per run.
    pub ticks: u64,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// Every run produced the same hash.
    pub deterministic: bool,
    /// Wall-clock duration.
    pub duration_seconds: f64,
}

/// Run `scenario` `config.runs` times in parallel and compare final hashes.
pub fn verify_determinism(
    scenario: &Scenario,
    config: &VerifyConfig,
) -> Result<VerifyResult, ScenarioError> {
    let start = Instant::now();
    let run_config = RunConfig {
        max_ticks: config.ticks,
        stop_when_settled: false,
    };
    let run_all = || {
        (0..config.runs)
            .into_par_iter()
            .map(|_| run_scenario(scenario, run_config).map(|r| r.final_state_hash))
            .collect::<Result<Vec<u64>, ScenarioError>>()
    };

    let hashes = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all)?,
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global one");
                run_all()?
            }
        }
    } else {
        run_all()?
    };

    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    let result = VerifyResult {
        scenario: scenario.name.clone(),
        ticks: config.ticks,
        hashes,
        deterministic,
        duration_seconds: start.elapsed().as_secs_f64(),
    };
    info!(
        scenario = %result.scenario,
        runs = result.hashes.len(),
        deterministic = result.deterministic,
        "Determinism check finished"
    );
    Ok(result)
}

/// Timing of a crowd run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    /// Units in the crowd.
    pub units: usize,
    /// Ticks simulated.
    pub ticks: u64,
    /// Wall-clock duration.
    pub total_seconds: f64,
    /// Simulation speed.
    pub ticks_per_second: f64,
    /// Search work.
    pub searches: SearchTotals,
}

/// Time `ticks` ticks of a crowd of `units` walkers crossing the map.
pub fn bench_crowd(units: usize, ticks: u64) -> Result<BenchResult, ScenarioError> {
    let scenario = Scenario::crowd(units);
    let report = run_scenario(
        &scenario,
        RunConfig {
            max_ticks: ticks,
            stop_when_settled: false,
        },
    )?;
    let ticks_per_second = if report.duration_seconds > 0.0 {
        report.ticks as f64 / report.duration_seconds
    } else {
        0.0
    };
    Ok(BenchResult {
        units,
        ticks: report.ticks,
        total_seconds: report.duration_seconds,
        ticks_per_second,
        searches: report.searches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_head_on() {
        let config = VerifyConfig {
            runs: 4,
            ticks: 200,
            parallel: 2,
        };
        let result = verify_determinism(&Scenario::head_on(), &config).unwrap();
        assert!(result.deterministic);
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_verify_reports_errors() {
        let mut scenario = Scenario::head_on();
        scenario.map.clear();
        assert!(verify_determinism(&scenario, &VerifyConfig::default()).is_err());
    }

    #[test]
    fn test_bench_crowd_counts_searches() {
        let result = bench_crowd(32, 10).unwrap();
        assert_eq!(result.ticks, 10);
        assert!(result.searches.short_searches >= 32);
        assert!(result.searches.max_short_expanded <= 250);
    }
}
