//! Picking up orders, planning routes and ending them.

use super::{MovementState, Step};
use crate::error::Result;
use crate::long_path::LongPath;
use crate::math::{Heading, Point, Rect};
use crate::path::Path;
use crate::regions::RegionGraph;
use crate::short_path::{Obstacles, ShortPathRequest};
use crate::units::{MoveFlags, Unit, UnitId};
use crate::world::World;

/// Whether the order layer issued an order the unit has not picked up yet.
#[must_use]
pub fn has_new_order(unit: &Unit) -> bool {
    unit.movement.order_serial != unit.movement.served_serial
}

/// Mark a pending order as picked up and reset per-order bookkeeping.
/// Returns false when there was no new order.
pub fn take_order(world: &mut World, id: UnitId) -> Result<bool> {
    let m = &mut world.unit_mut(id)?.movement;
    if m.order_serial == m.served_serial {
        return Ok(false);
    }
    m.served_serial = m.order_serial;
    m.retries = 0;
    m.timer = 0;
    m.last_partial = None;
    m.blocker = None;
    m.avoid_movers = false;
    m.flags.set(MoveFlags::AT_TARGET, false);
    m.flags.set(MoveFlags::IMMOVABLE, false);
    Ok(true)
}

/// Stationary; wait for an order.
pub fn at_rest(world: &mut World, id: UnitId) -> Result<Step> {
    if has_new_order(world.unit(id)?) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    Ok(Step::Yield(MovementState::AtRest))
}

/// Pick up the order. Ordering a unit to where it already stands is
/// satisfied on the spot.
pub fn new_target(world: &mut World, id: UnitId) -> Result<Step> {
    take_order(world, id)?;
    world.release_path(id)?;
    let unit = world.unit(id)?;
    if world.goal_point(unit) == unit.position() {
        return Ok(Step::Continue(MovementState::AtMoveTarget));
    }
    Ok(Step::Continue(MovementState::StartPath))
}

/// Plan toward the destination.
///
/// A first attempt at a close, unobstructed goal walks straight without a
/// path. Everything else gets a pooled path with a fresh corridor.
pub fn start_path(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    let start = unit.position();
    let goal = world.goal_point(unit);
    let target_unit = unit.movement.target_unit;
    let order_serial = unit.movement.order_serial;

    if unit.movement.retries == 0
        && unit.movement.path.is_none()
        && start.distance(goal) <= world.config.direct_reach.unsigned_abs()
    {
        let obstacles = Obstacles::new(
            &world.map,
            &world.units,
            &world.finder,
            id,
            target_unit,
            false,
        )?;
        if obstacles.straight_move_clear(start, goal)? {
            world.unit_mut(id)?.movement.next_waypoint = goal;
            return Ok(Step::Continue(MovementState::FollowPath));
        }
    }

    world.release_path(id)?;
    let pid = world.paths.alloc()?;
    let long = world.long_search(start, goal);
    let tick = world.tick;
    let path = world.paths.get_mut(pid)?;
    path.source = start;
    path.destination = goal;
    path.target_unit = target_unit;
    path.order_serial = order_serial;
    apply_long(path, world.map.regions(), long, start, goal, tick);
    world.unit_mut(id)?.movement.path = Some(pid);
    Ok(Step::Continue(MovementState::NextLeg))
}

/// Install a long search result into `path`.
fn apply_long(
    path: &mut Path,
    graph: &RegionGraph,
    long: Option<LongPath>,
    from: Point,
    goal: Point,
    tick: u64,
) {
    path.reachable = match (graph.region_at(from), graph.region_at(goal)) {
        (Some(a), Some(b)) => graph.same_group(a, b),
        _ => false,
    };
    path.created_tick = tick;
    path.needs_replan = false;
    path.long_cursor = 0;
    match long {
        Some(long) => {
            path.corridor = long.regions;
            path.total_len = long.total_len;
            path.truncated = long.truncated;
            path.fully_reached = long.fully_reached;
        }
        None => {
            path.corridor.clear();
            path.total_len = 0;
            path.truncated = false;
            path.fully_reached = false;
        }
    }
}

/// Point the next leg steers toward, and whether it ends the route.
fn leg_target(path: &mut Path, graph: &RegionGraph, here: Point, goal: Point) -> (Point, bool) {
    let position = graph
        .region_at(here)
        .and_then(|r| path.corridor.iter().position(|&c| c == r));
    if let Some(i) = position {
        path.long_cursor = i;
    }
    let Some(&last) = path.corridor.last() else {
        return (goal, true);
    };
    if path.truncated && position.is_none() && path.long_cursor == 0 {
        return (graph.region(path.corridor[0]).center, false);
    }
    if let Some(&ahead) = path.corridor.get(path.long_cursor + 2) {
        return (graph.region(ahead).center, false);
    }
    if path.fully_reached {
        (goal, true)
    } else if !path.reachable {
        // As close as the unit's group gets.
        let b = graph.region(last).bounds;
        (
            Rect::new(b.left, b.top, b.right - 1, b.bottom - 1).clamp_closed(goal),
            true,
        )
    } else {
        (graph.region(last).center, false)
    }
}

/// Plan the next short leg, refreshing the corridor when it is too short or stale.
pub fn next_leg(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    let Some(pid) = unit.movement.path else {
        return Ok(Step::Continue(MovementState::StartPath));
    };
    let here = unit.position();
    let goal = world.goal_point(unit);
    let target_unit = unit.movement.target_unit;
    let include_movers = unit.movement.avoid_movers;
    let retrying = unit.movement.retries > 0;

    let tick = world.tick;
    let reusable = world.paths.get(pid)?.corridor_reusable(
        tick,
        world.config.reuse_corridor_min_legs,
        world.config.stale_path_ticks,
    );
    if !reusable {
        let long = world.long_search(here, goal);
        let path = world.paths.get_mut(pid)?;
        apply_long(path, world.map.regions(), long, here, goal, tick);
        path.destination = goal;
    }

    let path = world.paths.get_mut(pid)?;
    let (target, final_leg) = leg_target(path, world.map.regions(), here, goal);
    path.final_leg = final_leg;
    let avoid = path
        .last_blocker
        .filter(|&b| retrying && world.units.get(b).is_some());

    let request = ShortPathRequest {
        mover: id,
        start: here,
        goal: target,
        target_unit: if final_leg { target_unit } else { None },
        include_movers,
        avoid,
    };
    let leg = world.short_search(&request)?;
    world.unit_mut(id)?.movement.avoid_movers = false;

    let first = leg.waypoints.first().copied();
    let reached = leg.reached;
    world.paths.get_mut(pid)?.set_leg(leg.waypoints, reached);

    match first {
        Some(waypoint) => {
            world.unit_mut(id)?.movement.next_waypoint = waypoint;
            Ok(Step::Continue(MovementState::FollowPath))
        }
        None if reached && final_leg => finish_leg(world, id),
        None => Ok(Step::Continue(MovementState::PartialArrival)),
    }
}

/// Decide what follows a finished leg.
pub fn finish_leg(world: &mut World, id: UnitId) -> Result<Step> {
    let Some((final_leg, reached, reachable)) = world
        .path_of(id)?
        .map(|p| (p.final_leg, p.leg_reached, p.reachable))
    else {
        return Ok(Step::Continue(MovementState::AtMoveTarget));
    };
    let next = match (final_leg, reached) {
        (true, true) if reachable => MovementState::AtMoveTarget,
        (true, true) => MovementState::FailedPath,
        (_, false) => MovementState::PartialArrival,
        (false, true) => {
            world.unit_mut(id)?.movement.retries = 0;
            MovementState::NextLeg
        }
    };
    Ok(Step::Continue(next))
}

/// A leg ended short of its target. Replans next tick; a unit that keeps
/// ending up in the same place counts that as a failure.
pub fn partial_arrival(world: &mut World, id: UnitId) -> Result<Step> {
    if has_new_order(world.unit(id)?) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    let max = world.config.max_collision_retries;
    let m = &mut world.unit_mut(id)?.movement;
    if m.last_partial == Some(m.position) {
        m.retries = m.retries.saturating_add(1);
    }
    m.last_partial = Some(m.position);
    if m.retries > max {
        return Ok(Step::Continue(MovementState::FailedPath));
    }
    if let Some(path) = world.path_mut_of(id)? {
        path.needs_replan = true;
    }
    Ok(Step::Yield(MovementState::NextLeg))
}

/// Replan the current leg after a failed resolution.
pub fn retry_path(world: &mut World, id: UnitId, with_movers: bool) -> Result<Step> {
    let max = world.config.max_collision_retries;
    let m = &mut world.unit_mut(id)?.movement;
    m.retries = m.retries.saturating_add(1);
    if m.retries > max {
        return Ok(Step::Continue(MovementState::FailedPath));
    }
    m.avoid_movers = with_movers;
    if m.path.is_some() {
        Ok(Step::Continue(MovementState::NextLeg))
    } else {
        Ok(Step::Continue(MovementState::StartPath))
    }
}

/// Give up on the destination.
pub fn failed_path(world: &mut World, id: UnitId) -> Result<Step> {
    world.release_path(id)?;
    let m = &mut world.unit_mut(id)?.movement;
    m.mark_immovable();
    tracing::warn!(
        unit = ?id,
        retries = m.retries,
        destination = ?m.destination,
        "unit marked immovable"
    );
    Ok(Step::Continue(MovementState::Immovable))
}

/// Gave up; only a new order gets the unit going again.
pub fn immovable(world: &mut World, id: UnitId) -> Result<Step> {
    if has_new_order(world.unit(id)?) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    Ok(Step::Yield(MovementState::Immovable))
}

/// Arrived: drop the path and report it.
pub fn at_move_target(world: &mut World, id: UnitId) -> Result<Step> {
    world.release_path(id)?;
    let unit = world.unit_mut(id)?;
    let m = &mut unit.movement;
    m.mark_arrived();
    m.retries = 0;
    m.last_partial = None;
    if m.target_unit.is_some() {
        Ok(Step::Continue(MovementState::TurnToFace))
    } else {
        Ok(Step::Continue(MovementState::AtRest))
    }
}

/// Turn toward the target unit after arriving next to it.
pub fn turn_to_face(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    let Some(target) = unit.movement.target_unit.and_then(|t| world.units.get(t)) else {
        return Ok(Step::Continue(MovementState::AtRest));
    };
    let d = target.position() - unit.position();
    let wanted = Heading::from_delta(i64::from(d.x), i64::from(d.y));

    let m = &mut world.unit_mut(id)?.movement;
    m.heading = m.heading.turn_toward(wanted, m.turn_rate);
    let done = m.heading == wanted || d == Point::default();
    m.flags.set(MoveFlags::TURNING, !done);
    if done {
        Ok(Step::Continue(MovementState::AtRest))
    } else {
        Ok(Step::Yield(MovementState::TurnToFace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionId;
    use crate::terrain::TileGrid;

    fn strip(len: usize) -> RegionGraph {
        let rows = vec![".".repeat(len)];
        RegionGraph::from_tiles(&TileGrid::from_rows(&rows).unwrap(), 1).unwrap()
    }

    #[test]
    fn test_leg_targets_two_regions_ahead() {
        let g = strip(10);
        let mut path = Path {
            corridor: (0..10).map(RegionId).collect(),
            fully_reached: true,
            reachable: true,
            ..Path::default()
        };
        let goal = Point::new(9 * 32 + 16, 16);
        let (target, last) = leg_target(&mut path, &g, Point::new(40, 16), goal);
        assert_eq!(path.long_cursor, 1);
        assert_eq!(target, g.region(RegionId(3)).center);
        assert!(!last);

        let (target, last) = leg_target(&mut path, &g, Point::new(8 * 32, 16), goal);
        assert_eq!(target, goal);
        assert!(last);
    }

    #[test]
    fn test_truncated_corridor_is_entered_first() {
        let g = strip(10);
        let mut path = Path {
            corridor: (5..10).map(RegionId).collect(),
            truncated: true,
            fully_reached: true,
            reachable: true,
            ..Path::default()
        };
        let (target, last) = leg_target(&mut path, &g, Point::new(16, 16), Point::new(300, 16));
        assert_eq!(target, g.region(RegionId(5)).center);
        assert!(!last);
    }

    #[test]
    fn test_unreachable_goal_is_clamped_into_last_region() {
        let g = strip(4);
        let mut path = Path {
            corridor: vec![RegionId(0), RegionId(1)],
            fully_reached: false,
            reachable: false,
            ..Path::default()
        };
        let (target, last) = leg_target(&mut path, &g, Point::new(16, 16), Point::new(500, 900));
        assert_eq!(target, Point::new(63, 31));
        assert!(last);
    }
}
