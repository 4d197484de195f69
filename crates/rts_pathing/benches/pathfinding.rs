//! Pathfinding benchmarks for rts_pathing.
//!
//! Run with: `cargo bench -p rts_pathing`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rts_pathing::config::NavConfig;
use rts_pathing::long_path::find_long_path;
use rts_pathing::map::GameMap;
use rts_pathing::math::Point;
use rts_pathing::short_path::ShortPathRequest;
use rts_pathing::terrain::TileGrid;
use rts_pathing_test_utils::fixtures::{crowd_scenario, fixed, sim_from_rows, spawn_walker};

/// 128×128 tiles with a vertical wall every 16 columns, each broken by a gap.
fn maze_rows() -> Vec<String> {
    (0..128)
        .map(|y| {
            (0..128)
                .map(|x| {
                    let wall = x % 16 == 15;
                    let gap = (y + x * 3) % 40 < 4;
                    if wall && !gap {
                        '#'
                    } else {
                        '.'
                    }
                })
                .collect()
        })
        .collect()
}

/// Long searches across the maze.
pub fn long_path_benchmark(c: &mut Criterion) {
    let config = NavConfig::default();
    let grid = TileGrid::from_rows(&maze_rows()).expect("valid maze");
    let map = GameMap::from_tiles(grid, config.region_tiles).expect("valid maze");

    c.bench_function("long_path_across_maze", |b| {
        b.iter(|| {
            find_long_path(
                black_box(map.regions()),
                black_box(Point::new(16, 16)),
                black_box(Point::new(4000, 4000)),
                &config,
            )
        });
    });
}

/// A single short search past a wall gap.
pub fn short_path_benchmark(c: &mut Criterion) {
    let mut sim = sim_from_rows(&maze_rows(), 4);
    let mover = spawn_walker(&mut sim, Point::new(400, 300), fixed(4));
    let request = ShortPathRequest {
        mover,
        start: Point::new(400, 300),
        goal: Point::new(600, 360),
        target_unit: None,
        include_movers: false,
        avoid: None,
    };
    let world = sim.world();

    c.bench_function("short_path_past_wall", |b| {
        b.iter(|| {
            rts_pathing::short_path::find_short_path(
                &world.map,
                &world.units,
                &world.finder,
                black_box(&request),
                &world.config,
            )
        });
    });
}

/// The tick in which 160 units all plan at once.
pub fn crowd_tick_benchmark(c: &mut Criterion) {
    c.bench_function("crowd_160_planning_tick", |b| {
        b.iter_batched(
            || crowd_scenario(160).0,
            |mut sim| sim.tick(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    long_path_benchmark,
    short_path_benchmark,
    crowd_tick_benchmark
);
criterion_main!(benches);
