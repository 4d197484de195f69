//! End-to-end movement scenarios.
//!
//! Each test drives a full [`Simulation`] through the public API and
//! checks what the order layer would observe.

use rts_pathing::math::{Point, Rect};
use rts_pathing::movement::MovementState;
use rts_pathing::simulation::Simulation;
use rts_pathing::units::{UnitId, UnitSpec};
use rts_pathing_test_utils::fixtures::{
    building_detour_scenario, crowd_scenario, fixed, head_on_scenario, open_sim, order,
    run_until, run_until_arrived, settle, spawn_walker, WALKER_HALF,
};

fn position(sim: &Simulation, id: UnitId) -> Point {
    sim.status(id).unwrap().position
}

// =============================================================================
// Head-on collision
// =============================================================================

#[test]
fn test_head_on_units_sidestep_within_one_tick() {
    let (mut sim, left, right) = head_on_scenario();

    let ticks = run_until(&mut sim, 100, |s, _| {
        s.status(left).unwrap().collided || s.status(right).unwrap().collided
    });
    assert!(ticks.is_some(), "units never met");

    let resolving = |s: &Simulation| {
        [left, right].iter().any(|&u| {
            matches!(
                s.status(u).unwrap().state,
                MovementState::SlideFree | MovementState::WaitFree
            )
        })
    };
    if !resolving(&sim) {
        sim.tick().unwrap();
        assert!(resolving(&sim), "no unit slid or waited after the collision");
    }
}

#[test]
fn test_head_on_units_never_teleport() {
    let (mut sim, left, right) = head_on_scenario();
    for _ in 0..300 {
        let before = [position(&sim, left), position(&sim, right)];
        sim.tick().unwrap();
        let after = [position(&sim, left), position(&sim, right)];
        for (b, a) in before.iter().zip(&after) {
            assert!(b.distance(*a) <= 8, "jumped from {b:?} to {a:?}");
        }
    }
}

#[test]
fn test_head_on_units_pass_each_other() {
    let (mut sim, left, right) = head_on_scenario();
    run_until(&mut sim, 400, |s, _| {
        s.status(left).unwrap().at_target && s.status(right).unwrap().at_target
    })
    .expect("both units arrive");
    assert_eq!(position(&sim, left), Point::new(340, 80));
    assert_eq!(position(&sim, right), Point::new(44, 80));
}

// =============================================================================
// Routing around a building
// =============================================================================

#[test]
fn test_detour_waypoints_avoid_the_building() {
    let (mut sim, walker, footprint) = building_detour_scenario();

    let arrived = run_until(&mut sim, 400, |s, _| {
        if let Some(path) = s.world().path_of(walker).unwrap() {
            for w in &path.waypoints {
                assert!(!footprint.contains(*w), "waypoint {w:?} inside the building");
            }
        }
        let bbox = s.unit(walker).unwrap().bbox();
        assert!(!bbox.overlaps(&footprint), "walker box {bbox:?} entered the building");
        s.status(walker).unwrap().at_target
    });

    assert!(arrived.is_some(), "walker never arrived");
    assert_eq!(position(&sim, walker), Point::new(420, 192));
    assert!(!sim.status(walker).unwrap().immovable);
}

// =============================================================================
// Many searches in one tick
// =============================================================================

#[test]
fn test_crowd_searches_stay_within_budget() {
    let (mut sim, units) = crowd_scenario(160);
    let events = sim.tick().unwrap();

    let counters = events.searches;
    assert!(
        counters.short_searches >= 150,
        "only {} short searches ran",
        counters.short_searches
    );
    assert!(counters.max_short_expanded <= sim.config().short_expand_limit);
    assert!(counters.max_short_open <= sim.config().short_open_limit);

    for &u in &units {
        let state = sim.status(u).unwrap().state;
        assert_ne!(state, MovementState::AtRest, "unit {u:?} never planned");
    }
}

#[test]
fn test_crowd_keeps_budget_over_time() {
    let (mut sim, _) = crowd_scenario(160);
    let budget = (sim.config().short_expand_limit, sim.config().short_open_limit);
    for _ in 0..40 {
        let events = sim.tick().unwrap();
        assert!(events.searches.max_short_expanded <= budget.0);
        assert!(events.searches.max_short_open <= budget.1);
    }
}

// =============================================================================
// Remembered blocker removed mid-replan
// =============================================================================

#[test]
fn test_replan_survives_removed_blocker() {
    let mut sim = open_sim(16, 5, 8);
    let walker = spawn_walker(&mut sim, Point::new(40, 80), fixed(4));
    settle(&mut sim);
    order(&mut sim, walker, Point::new(440, 80));
    for _ in 0..5 {
        sim.tick().unwrap();
    }

    // Dropped onto the walker's line after its path was planned.
    let wall = sim
        .spawn_unit(&UnitSpec::building(Rect::new(140, 48, 188, 112)))
        .unwrap();

    run_until(&mut sim, 100, |s, _| {
        s.world()
            .path_of(walker)
            .unwrap()
            .is_some_and(|p| p.last_blocker == Some(wall))
    })
    .expect("walker never ran into the building");

    sim.remove_unit(wall).unwrap();
    assert!(sim.world().units.get(wall).is_none());

    let arrived = run_until_arrived(&mut sim, walker, 300);
    assert!(arrived.is_some(), "walker never arrived after the blocker vanished");
    assert_eq!(position(&sim, walker), Point::new(440, 80));
}

// =============================================================================
// Unreachable destinations
// =============================================================================

#[test]
fn test_unreachable_destination_gives_up_near_the_wall() {
    let rows = ["........#...", "........#...", "........#...", "........#..."];
    let mut sim = rts_pathing_test_utils::fixtures::sim_from_rows(&rows, 8);
    let walker = spawn_walker(&mut sim, Point::new(48, 64), fixed(4));
    settle(&mut sim);
    order(&mut sim, walker, Point::new(330, 64));

    let mut stuck_event = false;
    let ticks = run_until(&mut sim, 300, |s, events| {
        stuck_event |= events.stuck.contains(&walker);
        s.status(walker).unwrap().immovable
    });

    assert!(ticks.is_some(), "walker never gave up");
    assert!(stuck_event);
    let status = sim.status(walker).unwrap();
    assert!(!status.at_target);
    assert!(status.position.x > 128, "walker stopped at {:?}", status.position);
    assert!(status.position.x + WALKER_HALF <= 256);
}

#[test]
fn test_new_order_clears_immovable() {
    let rows = ["........#...", "........#..."];
    let mut sim = rts_pathing_test_utils::fixtures::sim_from_rows(&rows, 8);
    let walker = spawn_walker(&mut sim, Point::new(48, 32), fixed(4));
    settle(&mut sim);
    order(&mut sim, walker, Point::new(330, 32));
    run_until(&mut sim, 300, |s, _| s.status(walker).unwrap().immovable)
        .expect("walker gives up");

    order(&mut sim, walker, Point::new(48, 32));
    run_until_arrived(&mut sim, walker, 200).expect("walker comes back");
    assert!(!sim.status(walker).unwrap().immovable);
}

// =============================================================================
// Crossing through a one-tile gap
// =============================================================================

#[test]
fn test_head_on_pair_crosses_a_narrow_gap() {
    let rows = [
        "......#.....",
        "......#.....",
        "............",
        "......#.....",
        "......#.....",
    ];
    let mut sim = rts_pathing_test_utils::fixtures::sim_from_rows(&rows, 8);
    let left = spawn_walker(&mut sim, Point::new(64, 80), fixed(4));
    let right = spawn_walker(&mut sim, Point::new(320, 80), fixed(4));
    settle(&mut sim);
    order(&mut sim, left, Point::new(340, 80));
    order(&mut sim, right, Point::new(44, 80));

    let mut gave_up = Vec::new();
    run_until(&mut sim, 600, |s, events| {
        gave_up.extend_from_slice(&events.stuck);
        s.status(left).unwrap().at_target && s.status(right).unwrap().at_target
    })
    .expect("both units cross the gap");

    assert!(gave_up.is_empty(), "gave up: {gave_up:?}");
    assert_eq!(position(&sim, left), Point::new(340, 80));
    assert_eq!(position(&sim, right), Point::new(44, 80));
}

// =============================================================================
// Spawned on an illegal spot
// =============================================================================

#[test]
fn test_walker_spawned_inside_building_walks_out() {
    let mut sim = open_sim(10, 6, 4);
    let footprint = Rect::new(96, 64, 160, 128);
    sim.spawn_unit(&UnitSpec::building(footprint)).unwrap();
    let walker = spawn_walker(&mut sim, Point::new(128, 96), fixed(4));

    let ticks = run_until(&mut sim, 40, |s, _| {
        s.status(walker).unwrap().state == MovementState::AtRest
    });
    assert!(ticks.is_some(), "walker never settled");

    let bbox = sim.unit(walker).unwrap().bbox();
    assert!(!bbox.overlaps(&footprint), "still inside: {bbox:?}");
    assert_eq!(position(&sim, walker), Point::new(128, 56));
}
