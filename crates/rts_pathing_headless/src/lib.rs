//! Headless scenario runner for movement testing and CI verification.
//!
//! This crate drives the movement resolver without any graphics:
//!
//! - **Scenario runs**: load a RON scenario, run it and report where every
//!   unit ended up as JSON or ASCII art
//! - **Determinism checks**: run a scenario many times in parallel and
//!   compare final state hashes
//! - **Benchmarks**: time a crowd of units all planning at once
//!
//! Logs go to stderr; reports go to stdout or a file.
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario and draw the final state
//! cargo run -p rts_pathing_headless -- run --scenario detour --ascii
//!
//! # Run a scenario file and save the report
//! cargo run -p rts_pathing_headless -- run --scenario scenarios/corridor.ron --json report.json
//!
//! # Verify determinism
//! cargo run -p rts_pathing_headless -- verify --scenario crowd --runs 8
//! ```

pub mod ascii_visualizer;
pub mod batch;
pub mod report;
pub mod runner;
pub mod scenario;

pub use ascii_visualizer::{render_ascii, AsciiConfig};
pub use batch::{bench_crowd, verify_determinism, BenchResult, VerifyConfig, VerifyResult};
pub use report::{RunReport, SearchTotals, UnitReport};
pub use runner::{run_scenario, RunConfig, ScenarioRunner};
pub use scenario::{OrderTarget, Scenario, ScenarioError, ScheduledOrder, UnitKind, UnitPlacement};
