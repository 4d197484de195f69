//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the movement simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Every peer of a lockstep game runs its own movement resolver, so the
//! resolver must be bit-for-bit reproducible. Sources of non-determinism
//! include:
//!
//! - **Floating-point math**: exact positions use
//!   [`rts_pathing::math::Fixed`]; searches use integer costs.
//!
//! - **Hash iteration order**: the spatial index and the search open sets
//!   break every tie explicitly; nothing iterates a `HashMap`.
//!
//! - **Unit order**: units advance in stable slot order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual searches and states
//! 2. **Property tests**: random maps and orders still replay exactly
//! 3. **Parallel tests**: running N simulations on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use rts_pathing::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Advance a simulation by one tick.
///
/// # Panics
///
/// Panics if the tick reports a structural violation.
pub fn step(sim: &mut Simulation) {
    if let Err(err) = sim.tick() {
        panic!("tick {} failed: {err}", sim.get_tick());
    }
}

/// Run the simulation twice with identical setup and compare final hashes.
///
/// # Example
///
/// ```
/// use rts_pathing_test_utils::determinism::verify_simulation_determinism;
/// use rts_pathing_test_utils::fixtures::head_on_scenario;
///
/// assert!(verify_simulation_determinism(|| head_on_scenario().0, 120));
/// ```
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(2, num_ticks, &setup_fn, step, Simulation::state_hash).is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under different thread
/// scheduling or memory layout.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations_scoped<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        step(&mut sim);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        tracing::warn!("Simulations differ before the first tick");
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step(&mut sim1);
        step(&mut sim2);

        if sim1.state_hash() != sim2.state_hash() {
            tracing::warn!(tick, "Simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible maps, units and
/// orders for property-based testing of the resolver.
pub mod strategies {
    use proptest::prelude::*;
    use rts_pathing::math::{Fixed, Point};
    use rts_pathing::terrain::TILE_SIZE;

    /// Generate a movement speed between 1 and 8 pixels per tick, in
    /// quarter-pixel steps.
    pub fn arb_speed() -> impl Strategy<Value = Fixed> {
        (4i32..=32).prop_map(|q| Fixed::from_num(q) / Fixed::from_num(4))
    }

    /// Generate a unit half-size in pixels.
    pub fn arb_half_size() -> impl Strategy<Value = i32> {
        4i32..=12
    }

    /// Generate a pixel inside a `width × height` tile map.
    pub fn arb_point_on_map(width: usize, height: usize) -> impl Strategy<Value = Point> {
        let w = width as i32 * TILE_SIZE;
        let h = height as i32 * TILE_SIZE;
        (0..w, 0..h).prop_map(|(x, y)| Point::new(x, y))
    }

    /// Generate a pixel anywhere near the map, including far off its edges.
    pub fn arb_point_anywhere() -> impl Strategy<Value = Point> {
        (-5000i32..5000, -5000i32..5000).prop_map(|(x, y)| Point::new(x, y))
    }

    /// Generate `.`/`#` rows with roughly `wall_percent` percent walls.
    ///
    /// The left column is always walkable so every map has somewhere to
    /// stand.
    pub fn arb_map_rows(
        width: usize,
        height: usize,
        wall_percent: u32,
    ) -> impl Strategy<Value = Vec<String>> {
        let p = f64::from(wall_percent.min(100)) / 100.0;
        proptest::collection::vec(proptest::bool::weighted(p), width * height).prop_map(
            move |walls| {
                walls
                    .chunks(width)
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .map(|(x, &wall)| if wall && x > 0 { '#' } else { '.' })
                            .collect()
                    })
                    .collect()
            },
        )
    }

    /// Where a test walker starts and where it is sent.
    #[derive(Debug, Clone)]
    pub struct WalkerPlan {
        /// Spawn position.
        pub start: Point,
        /// Half-size in pixels.
        pub half: i32,
        /// Speed in pixels per tick.
        pub speed: Fixed,
        /// Ordered destination.
        pub destination: Point,
    }

    /// Generate one walker on a `width × height` map.
    pub fn arb_walker(width: usize, height: usize) -> impl Strategy<Value = WalkerPlan> {
        (
            arb_point_on_map(width, height),
            arb_half_size(),
            arb_speed(),
            arb_point_on_map(width, height),
        )
            .prop_map(|(start, half, speed, destination)| WalkerPlan {
                start,
                half,
                speed,
                destination,
            })
    }

    /// Generate up to `max_walkers` walkers.
    pub fn arb_walkers(
        width: usize,
        height: usize,
        max_walkers: usize,
    ) -> impl Strategy<Value = Vec<WalkerPlan>> {
        proptest::collection::vec(arb_walker(width, height), 1..max_walkers)
    }
}
