//! Headless movement scenario runner.
//!
//! Runs movement scenarios without graphics, for CI and for eyeballing
//! resolver behavior in a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario (a built-in name or a RON file)
//! cargo run -p rts_pathing_headless -- run --scenario head_on --ascii
//!
//! # Save the run report as JSON
//! cargo run -p rts_pathing_headless -- run --scenario scenarios/corridor.ron --json out/report.json
//!
//! # Verify determinism across parallel runs
//! cargo run -p rts_pathing_headless -- verify --scenario crowd --runs 8 --ticks 600
//!
//! # Time a crowd of units
//! cargo run -p rts_pathing_headless -- bench --units 200 --ticks 600
//! ```
//!
//! Built-in scenarios: `head_on`, `detour`, `crowd`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rts_pathing_headless::{
    ascii_visualizer::{render_ascii, AsciiConfig},
    batch::{bench_crowd, verify_determinism, VerifyConfig},
    runner::{RunConfig, ScenarioRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "rts_pathing_headless")]
#[command(about = "Headless movement scenario runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and report the outcome
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "head_on")]
        scenario: String,

        /// Maximum ticks to run
        #[arg(short, long, default_value = "600")]
        ticks: u64,

        /// Keep running after every unit has settled
        #[arg(long)]
        no_early_stop: bool,

        /// Draw the final state as ASCII art
        #[arg(long)]
        ascii: bool,

        /// Also draw every N ticks while running
        #[arg(long, requires = "ascii")]
        every: Option<u64>,

        /// Disable colored ASCII output
        #[arg(long)]
        no_color: bool,

        /// Write the JSON report to this file instead of stdout
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario several times in parallel
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "crowd")]
        scenario: String,

        /// Number of runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Ticks per run
        #[arg(short, long, default_value = "600")]
        ticks: u64,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,
    },

    /// Time a crowd of units crossing an open map
    Bench {
        /// Units in the crowd
        #[arg(short, long, default_value = "160")]
        units: usize,

        /// Ticks to run
        #[arg(short, long, default_value = "600")]
        ticks: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            no_early_stop,
            ascii,
            every,
            no_color,
            json,
        } => {
            let config = RunConfig {
                max_ticks: ticks,
                stop_when_settled: !no_early_stop,
            };
            let ascii = ascii.then(|| AsciiConfig {
                use_color: !no_color,
                ..AsciiConfig::default()
            });
            cmd_run(&scenario, config, ascii.as_ref(), every, json);
        }
        Commands::Verify {
            scenario,
            runs,
            ticks,
            parallel,
        } => {
            cmd_verify(
                &scenario,
                VerifyConfig {
                    runs,
                    ticks,
                    parallel,
                },
            );
        }
        Commands::Bench { units, ticks } => {
            cmd_bench(units, ticks);
        }
    }
}

fn load_or_exit(name: &str) -> Scenario {
    match Scenario::resolve(name) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, scenario = name, "Failed to load scenario");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Run one scenario
fn cmd_run(
    name: &str,
    config: RunConfig,
    ascii: Option<&AsciiConfig>,
    every: Option<u64>,
    json: Option<PathBuf>,
) {
    let scenario = load_or_exit(name);
    tracing::info!(
        scenario = %scenario.name,
        units = scenario.units.len(),
        orders = scenario.orders.len(),
        max_ticks = config.max_ticks,
        "Starting run"
    );

    let runner = match ScenarioRunner::new(&scenario, config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    let max_ticks = config.max_ticks;
    let mut last_frame = None;
    let result = runner.run_with(|runner, _| {
        let Some(ascii) = ascii else {
            return;
        };
        let tick = runner.sim().get_tick();
        if every.is_some_and(|n| n > 0 && tick % n == 0) {
            eprint!("{}", render_ascii(runner.sim(), &scenario.name, ascii));
        }
        if tick >= max_ticks || runner.is_settled() {
            last_frame = Some(render_ascii(runner.sim(), &scenario.name, ascii));
        }
    });

    let report = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    if let Some(frame) = last_frame {
        eprint!("{frame}");
    }
    eprintln!("{}", report.summary_line());

    match json {
        Some(path) => {
            if let Err(e) = report.save(&path) {
                tracing::error!(error = %e, path = %path.display(), "Failed to save report");
                eprintln!("FATAL: Failed to save report: {e}");
                std::process::exit(1);
            }
            tracing::info!(path = %path.display(), "Report saved");
        }
        None => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("FATAL: Failed to encode report: {e}");
                std::process::exit(1);
            }
        },
    }
}

/// Verify determinism
fn cmd_verify(name: &str, config: VerifyConfig) {
    let scenario = load_or_exit(name);
    tracing::info!(
        "Verifying determinism: {} ({} runs of {} ticks)",
        scenario.name,
        config.runs,
        config.ticks
    );

    match verify_determinism(&scenario, &config) {
        Ok(result) if result.deterministic => {
            eprintln!(
                "PASS: All {} runs produced identical results (hash {:016x})",
                result.hashes.len(),
                result.hashes.first().copied().unwrap_or_default()
            );
        }
        Ok(result) => {
            eprintln!("FAIL: Non-determinism detected!");
            for (i, hash) in result.hashes.iter().enumerate() {
                eprintln!("  run {i}: {hash:016x}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Time a crowd
fn cmd_bench(units: usize, ticks: u64) {
    tracing::info!("Running {} tick benchmark with {} units", ticks, units);

    let result = match bench_crowd(units, ticks) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Units: {}", result.units);
    eprintln!("Ticks: {}", result.ticks);
    eprintln!("Time: {:.3}s", result.total_seconds);
    eprintln!("Ticks/second: {:.0}", result.ticks_per_second);
    eprintln!(
        "Searches: {} short, {} long (peak {} short in one tick)",
        result.searches.short_searches,
        result.searches.long_searches,
        result.searches.peak_short_searches_per_tick
    );
    eprintln!(
        "Largest short search: {} expanded, {} open",
        result.searches.max_short_expanded, result.searches.max_short_open
    );
}
