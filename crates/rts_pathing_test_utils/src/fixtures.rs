//! Test fixtures and helpers.
//!
//! Pre-built maps and unit setups for consistent testing.

use rts_pathing::config::NavConfig;
use rts_pathing::math::{Fixed, Point, Rect};
use rts_pathing::simulation::{MoveOrder, Simulation, TickEvents};
use rts_pathing::terrain::TILE_SIZE;
use rts_pathing::units::{UnitId, UnitSpec};

/// Half-size of the default test walker, in pixels.
pub const WALKER_HALF: i32 = 8;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create the fixed-point number `num / den`.
#[must_use]
pub fn fixed_ratio(num: i32, den: i32) -> Fixed {
    Fixed::from_num(num) / Fixed::from_num(den)
}

/// Center pixel of tile `(tx, ty)`.
#[must_use]
pub const fn tile_center(tx: i32, ty: i32) -> Point {
    Point::new(tx * TILE_SIZE + TILE_SIZE / 2, ty * TILE_SIZE + TILE_SIZE / 2)
}

/// Rows of an all-walkable map.
#[must_use]
pub fn open_rows(width: usize, height: usize) -> Vec<String> {
    (0..height).map(|_| ".".repeat(width)).collect()
}

/// Simulation over `rows` with the default config.
///
/// # Panics
///
/// Panics if the rows are not a valid map.
#[must_use]
pub fn sim_from_rows<S: AsRef<str>>(rows: &[S], capacity: usize) -> Simulation {
    Simulation::from_rows(rows, NavConfig::default(), capacity).expect("valid test map")
}

/// Simulation over an open `width × height` tile map.
#[must_use]
pub fn open_sim(width: usize, height: usize, capacity: usize) -> Simulation {
    sim_from_rows(&open_rows(width, height), capacity)
}

/// Spawn a default-sized ground unit.
///
/// # Panics
///
/// Panics if the arena is full.
pub fn spawn_walker(sim: &mut Simulation, at: Point, speed: Fixed) -> UnitId {
    sim.spawn_unit(&UnitSpec::ground(at, WALKER_HALF, speed))
        .expect("arena has room")
}

/// Issue a point order.
///
/// # Panics
///
/// Panics if the unit does not exist.
pub fn order(sim: &mut Simulation, unit: UnitId, to: Point) {
    sim.set_move_target(unit, MoveOrder::Point(to))
        .expect("unit exists");
}

/// Tick until `done` holds, up to `max_ticks`. Returns the ticks taken.
///
/// # Panics
///
/// Panics if a tick fails.
pub fn run_until<F>(sim: &mut Simulation, max_ticks: u64, mut done: F) -> Option<u64>
where
    F: FnMut(&Simulation, &TickEvents) -> bool,
{
    for n in 1..=max_ticks {
        let events = sim.tick().expect("tick succeeds");
        if done(sim, &events) {
            return Some(n);
        }
    }
    None
}

/// Tick until `unit` reports it is at its target.
pub fn run_until_arrived(sim: &mut Simulation, unit: UnitId, max_ticks: u64) -> Option<u64> {
    run_until(sim, max_ticks, |s, _| {
        s.status(unit).is_ok_and(|status| status.at_target)
    })
}

/// Two walkers on the same row ordered through each other's start.
///
/// Returns the simulation (already settled) and the two units.
#[must_use]
pub fn head_on_scenario() -> (Simulation, UnitId, UnitId) {
    let mut sim = open_sim(12, 5, 8);
    let left = spawn_walker(&mut sim, Point::new(64, 80), fixed(4));
    let right = spawn_walker(&mut sim, Point::new(320, 80), fixed(4));
    settle(&mut sim);
    order(&mut sim, left, Point::new(340, 80));
    order(&mut sim, right, Point::new(44, 80));
    (sim, left, right)
}

/// A walker on one side of a building, ordered to the other side.
///
/// Returns the simulation (already settled), the walker and the building's footprint.
#[must_use]
pub fn building_detour_scenario() -> (Simulation, UnitId, Rect) {
    let mut sim = open_sim(16, 12, 8);
    let footprint = Rect::new(192, 128, 320, 256);
    sim.spawn_unit(&UnitSpec::building(footprint))
        .expect("arena has room");
    let walker = spawn_walker(&mut sim, Point::new(100, 192), fixed(4));
    settle(&mut sim);
    order(&mut sim, walker, Point::new(420, 192));
    (sim, walker, footprint)
}

/// `count` walkers packed on the left of a wide open map, each ordered far
/// to the right (beyond direct-move reach, so every one plans a path).
#[must_use]
pub fn crowd_scenario(count: usize) -> (Simulation, Vec<UnitId>) {
    let mut sim = open_sim(64, 32, count + 8);
    let columns = 16;
    let units: Vec<UnitId> = (0..count)
        .map(|i| {
            let col = (i % columns) as i32;
            let row = (i / columns) as i32;
            spawn_walker(
                &mut sim,
                Point::new(40 + col * 24, 40 + row * 24),
                fixed(4),
            )
        })
        .collect();
    settle(&mut sim);
    for (i, &unit) in units.iter().enumerate() {
        let row = (i / columns) as i32;
        order(&mut sim, unit, Point::new(1600, 40 + row * 24));
    }
    (sim, units)
}

/// Run one tick so fresh units classify and index themselves.
///
/// # Panics
///
/// Panics if the tick fails.
pub fn settle(sim: &mut Simulation) {
    sim.tick().expect("tick succeeds");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_center() {
        assert_eq!(tile_center(0, 0), Point::new(16, 16));
        assert_eq!(tile_center(2, 1), Point::new(80, 48));
    }

    #[test]
    fn test_fixed_ratio() {
        assert_eq!(fixed_ratio(3, 2) * fixed(2), fixed(3));
    }

    #[test]
    fn test_crowd_layout_fits() {
        let (sim, units) = crowd_scenario(40);
        assert_eq!(units.len(), 40);
        for &u in &units {
            assert!(!sim.status(u).unwrap().immovable);
        }
    }
}
