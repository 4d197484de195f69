//! Collision resolution.
//!
//! When a move is blocked by a unit, [`choose_strategy`] looks at the
//! blocker's own motion and picks one of the [`CollisionStrategy`] options.
//! Every resolution that does not simply proceed counts as a retry; past
//! `max_collision_retries` the unit gives up on its destination.

use super::motion::{blocked_at, commit, step_toward, waypoint_reached, Blocked};
use super::planning::has_new_order;
use super::{CollisionStrategy, MovementState, Step};
use crate::error::Result;
use crate::math::{Fixed, Point, Vec2Fixed};
use crate::units::{MoveFlags, Unit, UnitId};
use crate::world::World;

/// Dominant-axis direction from the unit toward its next waypoint.
fn motion_axis(unit: &Unit) -> Point {
    let d = unit.movement.next_waypoint - unit.position();
    if d.x == 0 && d.y == 0 {
        Point::new(0, 0)
    } else if d.x.abs() >= d.y.abs() {
        Point::new(d.x.signum(), 0)
    } else {
        Point::new(0, d.y.signum())
    }
}

/// The two sides perpendicular to the motion, right-hand side first.
///
/// Two units meeting head-on prefer opposite sides and pass each other.
fn perpendiculars(axis: Point) -> [Point; 2] {
    if axis.x == 0 && axis.y == 0 {
        return [Point::new(0, -1), Point::new(0, 1)];
    }
    [Point::new(-axis.y, axis.x), Point::new(axis.y, -axis.x)]
}

/// Whole-pixel step sizes tried while sliding, largest first.
fn slide_sizes(speed: Fixed) -> [i32; 3] {
    let s = speed.ceil().to_num::<i32>().max(1);
    [s, (s / 2).max(1), 1]
}

fn offset(exact: Vec2Fixed, side: Point, amount: i32) -> Vec2Fixed {
    exact + Vec2Fixed::from_point(Point::new(side.x * amount, side.y * amount))
}

/// How far the unit can step toward `side` this tick: the largest clear
/// step out of twice its speed, its speed, half of it and one pixel.
fn free_run(world: &World, unit: &Unit, side: Point) -> Result<i32> {
    let [s, half, _] = slide_sizes(unit.movement.speed);
    for amount in [s * 2, s, half, 1] {
        if blocked_at(world, unit, offset(unit.movement.exact, side, amount), true)?.is_none() {
            return Ok(amount);
        }
    }
    Ok(0)
}

/// The freer perpendicular side, if either is free at all.
fn pick_slide(world: &World, unit: &Unit) -> Result<Option<Point>> {
    let [a, b] = perpendiculars(motion_axis(unit));
    let run_a = free_run(world, unit, a)?;
    let run_b = free_run(world, unit, b)?;
    Ok(match (run_a, run_b) {
        (0, 0) => None,
        (ra, rb) if rb > ra => Some(b),
        _ => Some(a),
    })
}

/// Whether a moving `other` is coming toward `unit` or is itself stopped by it.
fn head_on(unit: &Unit, other: &Unit) -> bool {
    let ours = Vec2Fixed::from_point(motion_axis(unit));
    other.movement.velocity.dot(ours) < Fixed::ZERO || other.movement.blocker == Some(unit.id)
}

/// Of two units in each other's way, the one in the lower slot keeps going
/// and the other gives way.
fn has_right_of_way(unit: &Unit, other: &Unit) -> bool {
    unit.id.index() < other.id.index()
}

/// Classify the collision recorded in `unit.movement.blocker`.
///
/// A head-on conflict between two movers is settled by slot order: the unit
/// with right of way slides past, the other waits and, once half its retries
/// are spent, replans around the movers. Waiting behind a unit that is
/// making progress away from the mover costs no retry.
pub fn choose_strategy(world: &World, unit: &Unit) -> Result<CollisionStrategy> {
    let config = &world.config;
    let Some(other) = unit.movement.blocker.and_then(|b| world.units.get(b)) else {
        return Ok(CollisionStrategy::Proceed);
    };
    if !World::blocks(unit, other) {
        return Ok(CollisionStrategy::Proceed);
    }
    if unit.movement.retries > config.max_collision_retries {
        return Ok(CollisionStrategy::GiveUp);
    }
    let escalate = unit.movement.retries >= config.max_collision_retries / 2;
    let ally = other.owner == unit.owner;

    if other.is_moving() {
        if !head_on(unit, other) {
            return Ok(CollisionStrategy::Wait);
        }
        if !has_right_of_way(unit, other) {
            return Ok(if escalate {
                CollisionStrategy::ReplanWithMovers
            } else {
                CollisionStrategy::Wait
            });
        }
        if escalate && ally {
            return Ok(CollisionStrategy::ForceThrough);
        }
        return Ok(if pick_slide(world, unit)?.is_some() {
            CollisionStrategy::Slide
        } else {
            CollisionStrategy::ReplanWithMovers
        });
    }

    let stuck = !other.is_mobile()
        || other.movement.flags.contains(MoveFlags::IMMOVABLE)
        || other.movement.idle_ticks >= config.idle_blocker_ticks;
    if stuck {
        return Ok(CollisionStrategy::Replan);
    }
    if ally && escalate {
        return Ok(CollisionStrategy::ForceThrough);
    }
    Ok(if pick_slide(world, unit)?.is_some() {
        CollisionStrategy::Slide
    } else {
        CollisionStrategy::Wait
    })
}

/// Whether resolving with `strategy` counts against the retry budget.
fn costs_retry(world: &World, unit: &Unit, strategy: CollisionStrategy) -> bool {
    if strategy != CollisionStrategy::Wait {
        return true;
    }
    match unit.movement.blocker.and_then(|b| world.units.get(b)) {
        Some(other) => {
            let advancing = other.movement.flags.contains(MoveFlags::MOVING);
            !(other.is_moving() && advancing) || head_on(unit, other)
        }
        None => true,
    }
}

/// A unit blocked the last move.
pub fn fix_collision(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    let strategy = choose_strategy(world, unit)?;
    let costly = costs_retry(world, unit, strategy);
    let slide = if strategy == CollisionStrategy::Slide {
        pick_slide(world, unit)?
    } else {
        None
    };
    tracing::debug!(
        unit = ?id,
        blocker = ?unit.movement.blocker,
        retries = unit.movement.retries,
        ?strategy,
        "collision"
    );

    let (wait, slide_ticks, force_ticks) = (
        world.config.wait_ticks,
        world.config.slide_ticks,
        world.config.force_ticks,
    );
    let m = &mut world.unit_mut(id)?.movement;
    m.flags.set(MoveFlags::COLLIDED, true);
    let next = match strategy {
        CollisionStrategy::Proceed => {
            m.blocker = None;
            MovementState::FollowPath
        }
        CollisionStrategy::Wait => {
            if costly {
                m.retries = m.retries.saturating_add(1);
            }
            m.timer = wait.max(1);
            return Ok(Step::Yield(MovementState::WaitFree));
        }
        CollisionStrategy::Slide => {
            m.retries = m.retries.saturating_add(1);
            m.timer = slide_ticks.max(1);
            m.slide_step = slide.unwrap_or_default();
            MovementState::SlideFree
        }
        CollisionStrategy::Replan => MovementState::RetryPath,
        CollisionStrategy::ReplanWithMovers => MovementState::RepathMovers,
        CollisionStrategy::ForceThrough => {
            m.retries = m.retries.saturating_add(1);
            m.timer = force_ticks.max(1);
            MovementState::ForceMoveFree
        }
        CollisionStrategy::GiveUp => MovementState::FailedPath,
    };
    Ok(Step::Continue(next))
}

/// Wait for the blocker to clear the way.
pub fn wait_free(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    let m = &unit.movement;
    let (next, _) = step_toward(m.exact, m.next_waypoint, m.speed);
    match blocked_at(world, unit, next, true)? {
        None => Ok(Step::Continue(MovementState::FollowPath)),
        Some(Blocked::Terrain) => Ok(Step::Continue(MovementState::FixTerrain)),
        Some(Blocked::Unit(other)) => {
            let m = &mut world.unit_mut(id)?.movement;
            m.blocker = Some(other);
            m.timer = m.timer.saturating_sub(1);
            if m.timer == 0 {
                Ok(Step::Continue(MovementState::FixCollision))
            } else {
                Ok(Step::Yield(MovementState::WaitFree))
            }
        }
    }
}

/// Sidestep until the direct move is free again.
pub fn slide_free(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::SlideFree));
    }
    let m = &unit.movement;
    let (direct, _) = step_toward(m.exact, m.next_waypoint, m.speed);
    if m.timer == 0 || blocked_at(world, unit, direct, true)?.is_none() {
        return Ok(Step::Continue(MovementState::FollowPath));
    }

    let side = m.slide_step;
    for amount in slide_sizes(m.speed) {
        let candidate = offset(m.exact, side, amount);
        if blocked_at(world, unit, candidate, true)?.is_none() {
            commit(world, id, candidate)?;
            let m = &mut world.unit_mut(id)?.movement;
            m.timer = m.timer.saturating_sub(1);
            return Ok(Step::Yield(MovementState::SlideFree));
        }
    }
    Ok(Step::Continue(MovementState::FixCollision))
}

/// Push toward the waypoint at reduced speed, ignoring units.
pub fn force_move_free(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::ForceMoveFree));
    }
    let m = &unit.movement;
    if m.timer == 0 {
        return Ok(Step::Continue(MovementState::FollowPath));
    }
    let divisor = Fixed::from_num(world.config.force_speed_divisor.max(1));
    let (next, arrived) = step_toward(m.exact, m.next_waypoint, m.speed / divisor);
    if blocked_at(world, unit, next, false)?.is_some() {
        return Ok(Step::Continue(MovementState::FixTerrain));
    }

    commit(world, id, next)?;
    let m = &mut world.unit_mut(id)?.movement;
    m.timer = m.timer.saturating_sub(1);
    m.flags.set(MoveFlags::FORCED, true);
    if arrived {
        return waypoint_reached(world, id);
    }
    Ok(Step::Yield(MovementState::ForceMoveFree))
}

/// Terrain blocked the last move: try sliding along one axis of it.
pub fn fix_terrain(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    let m = &unit.movement;
    let (next, _) = step_toward(m.exact, m.next_waypoint, m.speed);
    let delta = next - m.exact;

    let along_x = (Vec2Fixed::new(delta.x, Fixed::ZERO), Point::new(delta.x.signum().to_num(), 0));
    let along_y = (Vec2Fixed::new(Fixed::ZERO, delta.y), Point::new(0, delta.y.signum().to_num()));
    let axes = if delta.x.abs() >= delta.y.abs() {
        [along_x, along_y]
    } else {
        [along_y, along_x]
    };

    for (component, step) in axes {
        if component == Vec2Fixed::ZERO {
            continue;
        }
        if blocked_at(world, unit, m.exact + component, true)?.is_none() {
            let slide_ticks = world.config.slide_ticks.max(1);
            let m = &mut world.unit_mut(id)?.movement;
            m.slide_step = step;
            m.timer = slide_ticks;
            return Ok(Step::Continue(MovementState::TerrainSlide));
        }
    }
    Ok(Step::Continue(MovementState::RetryPath))
}

/// Slide along a terrain edge toward the waypoint's row or column.
pub fn terrain_slide(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::TerrainSlide));
    }
    let m = &unit.movement;
    let (direct, _) = step_toward(m.exact, m.next_waypoint, m.speed);
    if blocked_at(world, unit, direct, true)?.is_none() {
        return Ok(Step::Continue(MovementState::FollowPath));
    }
    if m.timer == 0 {
        return Ok(Step::Continue(MovementState::RetryPath));
    }

    let target = Vec2Fixed::from_point(m.next_waypoint);
    let side = m.slide_step;
    let remaining = if side.x != 0 {
        (target.x - m.exact.x) * Fixed::from_num(side.x)
    } else {
        (target.y - m.exact.y) * Fixed::from_num(side.y)
    };
    if remaining <= Fixed::ZERO {
        return Ok(Step::Continue(MovementState::RetryPath));
    }
    let amount = remaining.min(m.speed);
    let candidate = m.exact
        + Vec2Fixed::new(
            amount * Fixed::from_num(side.x),
            amount * Fixed::from_num(side.y),
        );
    match blocked_at(world, unit, candidate, true)? {
        None => {
            commit(world, id, candidate)?;
            let m = &mut world.unit_mut(id)?.movement;
            m.timer = m.timer.saturating_sub(1);
            Ok(Step::Yield(MovementState::TerrainSlide))
        }
        Some(Blocked::Unit(other)) => {
            world.unit_mut(id)?.movement.blocker = Some(other);
            Ok(Step::Continue(MovementState::FixCollision))
        }
        Some(Blocked::Terrain) => Ok(Step::Continue(MovementState::RetryPath)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavConfig;
    use crate::map::GameMap;
    use crate::math::Rect;
    use crate::movement::{advance, transition};
    use crate::terrain::TileGrid;
    use crate::units::UnitSpec;

    const OPEN: [&str; 6] = [".........."; 6];

    fn world(rows: &[&str]) -> World {
        let map = GameMap::from_tiles(TileGrid::from_rows(rows).unwrap(), 4).unwrap();
        World::new(map, NavConfig::default(), 8)
    }

    /// A resting walker, indexed in the unit finder.
    fn place(world: &mut World, at: Point, half: i32, owner: u8) -> UnitId {
        let id = world
            .units
            .spawn(&UnitSpec::ground(at, half, Fixed::from_num(4)))
            .unwrap();
        let unit = world.unit_mut(id).unwrap();
        unit.owner = owner;
        unit.movement.state = MovementState::AtRest;
        let bbox = unit.bbox();
        world.finder.insert(id, bbox);
        id
    }

    fn set_moving(world: &mut World, id: UnitId, waypoint: Point, velocity: Point) {
        let m = &mut world.unit_mut(id).unwrap().movement;
        m.state = MovementState::FollowPath;
        m.next_waypoint = waypoint;
        m.destination = waypoint;
        m.velocity = Vec2Fixed::from_point(velocity);
        m.flags.set(MoveFlags::MOVING, true);
    }

    fn blocked_by(world: &mut World, id: UnitId, other: UnitId, retries: u8) {
        let m = &mut world.unit_mut(id).unwrap().movement;
        m.blocker = Some(other);
        m.retries = retries;
    }

    fn strategy(world: &World, id: UnitId) -> CollisionStrategy {
        choose_strategy(world, world.unit(id).unwrap()).unwrap()
    }

    /// Two walkers on one row, the first in the lower slot, both heading
    /// into each other.
    fn head_on_pair(other_owner: u8) -> (World, UnitId, UnitId) {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        let b = place(&mut w, Point::new(118, 96), 8, other_owner);
        set_moving(&mut w, a, Point::new(200, 96), Point::new(4, 0));
        set_moving(&mut w, b, Point::new(20, 96), Point::new(-4, 0));
        (w, a, b)
    }

    #[test]
    fn test_missing_blocker_proceeds() {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        assert_eq!(strategy(&w, a), CollisionStrategy::Proceed);

        let b = place(&mut w, Point::new(118, 96), 8, 0);
        blocked_by(&mut w, a, b, 0);
        w.finder.remove(b).unwrap();
        w.units.remove(b);
        assert_eq!(strategy(&w, a), CollisionStrategy::Proceed);
    }

    #[test]
    fn test_exhausted_retries_give_up() {
        let (mut w, a, b) = head_on_pair(0);
        blocked_by(&mut w, a, b, 13);
        assert_eq!(strategy(&w, a), CollisionStrategy::GiveUp);
    }

    #[test]
    fn test_waiting_behind_a_leaving_unit_is_free() {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        let b = place(&mut w, Point::new(118, 96), 8, 0);
        set_moving(&mut w, a, Point::new(200, 96), Point::new(4, 0));
        set_moving(&mut w, b, Point::new(300, 96), Point::new(4, 0));
        blocked_by(&mut w, a, b, 0);

        assert_eq!(strategy(&w, a), CollisionStrategy::Wait);
        assert!(!costs_retry(&w, w.unit(a).unwrap(), CollisionStrategy::Wait));

        // A blocker that did not actually move last tick may be stuck too.
        w.unit_mut(b).unwrap().movement.flags.set(MoveFlags::MOVING, false);
        assert!(costs_retry(&w, w.unit(a).unwrap(), CollisionStrategy::Wait));
    }

    #[test]
    fn test_head_on_lower_slot_slides_and_higher_slot_waits() {
        let (mut w, a, b) = head_on_pair(0);
        blocked_by(&mut w, a, b, 0);
        blocked_by(&mut w, b, a, 0);
        assert_eq!(strategy(&w, a), CollisionStrategy::Slide);
        assert_eq!(strategy(&w, b), CollisionStrategy::Wait);
        assert!(costs_retry(&w, w.unit(b).unwrap(), CollisionStrategy::Wait));
    }

    #[test]
    fn test_head_on_escalation() {
        let (mut w, a, b) = head_on_pair(0);
        blocked_by(&mut w, a, b, 6);
        blocked_by(&mut w, b, a, 6);
        assert_eq!(strategy(&w, a), CollisionStrategy::ForceThrough);
        assert_eq!(strategy(&w, b), CollisionStrategy::ReplanWithMovers);

        // Enemies are never pushed through.
        let (mut w, a, b) = head_on_pair(1);
        blocked_by(&mut w, a, b, 6);
        assert_eq!(strategy(&w, a), CollisionStrategy::Slide);
    }

    #[test]
    fn test_stuck_blockers_trigger_replan() {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        set_moving(&mut w, a, Point::new(200, 96), Point::new(4, 0));

        let idle = place(&mut w, Point::new(118, 96), 8, 0);
        w.unit_mut(idle).unwrap().movement.idle_ticks = 24;
        blocked_by(&mut w, a, idle, 0);
        assert_eq!(strategy(&w, a), CollisionStrategy::Replan);

        let footprint = Rect::new(110, 120, 142, 152);
        let building = w.units.spawn(&UnitSpec::building(footprint)).unwrap();
        w.unit_mut(building).unwrap().movement.state = MovementState::Dormant;
        w.finder.insert(building, footprint);
        blocked_by(&mut w, a, building, 0);
        assert_eq!(strategy(&w, a), CollisionStrategy::Replan);
    }

    #[test]
    fn test_resting_ally_is_pushed_after_half_the_retries() {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        let b = place(&mut w, Point::new(118, 96), 8, 0);
        set_moving(&mut w, a, Point::new(200, 96), Point::new(4, 0));
        blocked_by(&mut w, a, b, 5);
        assert_eq!(strategy(&w, a), CollisionStrategy::Slide);
        blocked_by(&mut w, a, b, 6);
        assert_eq!(strategy(&w, a), CollisionStrategy::ForceThrough);
    }

    #[test]
    fn test_boxed_in_unit_waits_or_replans() {
        // The row fits the wide unit exactly; there is no room to slide.
        let mut w = world(&["##########", "..........", "##########"]);
        let a = place(&mut w, Point::new(100, 48), 16, 0);
        let b = place(&mut w, Point::new(134, 48), 16, 1);
        set_moving(&mut w, a, Point::new(300, 48), Point::new(4, 0));
        blocked_by(&mut w, a, b, 0);
        assert_eq!(strategy(&w, a), CollisionStrategy::Wait);

        set_moving(&mut w, b, Point::new(20, 48), Point::new(-4, 0));
        assert_eq!(strategy(&w, a), CollisionStrategy::ReplanWithMovers);
    }

    #[test]
    fn test_force_move_free_ignores_units_at_reduced_speed() {
        let mut w = world(&OPEN);
        let a = place(&mut w, Point::new(100, 96), 8, 0);
        let b = place(&mut w, Point::new(118, 96), 8, 0);
        set_moving(&mut w, a, Point::new(200, 96), Point::new(4, 0));
        blocked_by(&mut w, a, b, 6);
        w.unit_mut(a).unwrap().movement.state = MovementState::FixCollision;

        assert!(advance(&mut w, a).unwrap());
        let m = &w.unit(a).unwrap().movement;
        assert_eq!(m.state, MovementState::ForceMoveFree);
        assert_eq!(m.position, Point::new(102, 96));
        assert!(m.flags.contains(MoveFlags::FORCED));
        assert_eq!(m.retries, 7);
        assert_eq!(m.timer, 5);
        assert_eq!(w.finder.bbox(a), Some(Rect::new(94, 88, 110, 104)));
    }

    #[test]
    fn test_terrain_slide_runs_along_the_wall() {
        let mut w = world(&[
            "....#.....",
            "....#.....",
            "....#.....",
            "....#.....",
            "..........",
            "..........",
        ]);
        // Touching the wall's left face and heading down and to the right.
        let a = place(&mut w, Point::new(119, 60), 8, 0);
        set_moving(&mut w, a, Point::new(240, 170), Point::new(0, 0));

        assert!(advance(&mut w, a).unwrap());
        let m = &w.unit(a).unwrap().movement;
        assert_eq!(m.state, MovementState::TerrainSlide);
        assert_eq!(m.slide_step, Point::new(0, 1));
        assert_eq!(m.position, Point::new(119, 64));
        assert_eq!(m.timer, 5);
    }

    #[test]
    fn test_repath_movers_plans_around_moving_units() {
        let (mut w, a, b) = head_on_pair(0);
        // The higher slot yields; give it somewhere to go.
        blocked_by(&mut w, b, a, 6);
        w.unit_mut(b).unwrap().movement.state = MovementState::FixCollision;

        let step = transition(MovementState::FixCollision, &mut w, b).unwrap();
        assert_eq!(step, Step::Continue(MovementState::RepathMovers));
        let step = transition(MovementState::RepathMovers, &mut w, b).unwrap();
        assert_eq!(step, Step::Continue(MovementState::StartPath));
        assert!(w.unit(b).unwrap().movement.avoid_movers);
        assert_eq!(w.unit(b).unwrap().movement.retries, 7);

        let step = transition(MovementState::StartPath, &mut w, b).unwrap();
        assert_eq!(step, Step::Continue(MovementState::NextLeg));
        transition(MovementState::NextLeg, &mut w, b).unwrap();
        assert_eq!(w.counters.short_searches, 1);
        assert!(!w.unit(b).unwrap().movement.avoid_movers);
        assert!(w.path_of(b).unwrap().is_some());
    }

    #[test]
    fn test_slide_sides_are_perpendicular() {
        assert_eq!(
            perpendiculars(Point::new(1, 0)),
            [Point::new(0, 1), Point::new(0, -1)]
        );
        assert_eq!(
            perpendiculars(Point::new(0, -1)),
            [Point::new(1, 0), Point::new(-1, 0)]
        );
        // Opposite motions pick opposite sides first.
        assert_eq!(
            perpendiculars(Point::new(-1, 0))[0],
            Point::new(0, -1)
        );
    }

    #[test]
    fn test_slide_sizes_shrink() {
        assert_eq!(slide_sizes(Fixed::from_num(4)), [4, 2, 1]);
        assert_eq!(slide_sizes(Fixed::from_num(3) / Fixed::from_num(2)), [2, 1, 1]);
        assert_eq!(slide_sizes(Fixed::ZERO), [1, 1, 1]);
    }
}
