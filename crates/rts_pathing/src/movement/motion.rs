//! Integrating one tick of motion and detecting what is in the way.

use super::planning::{finish_leg, has_new_order};
use super::{MovementState, Step};
use crate::error::Result;
use crate::math::{Fixed, Heading, Point, Vec2Fixed};
use crate::units::{MoveFlags, Unit, UnitId, UnitMovement};
use crate::world::World;

/// Slack for snapping onto a waypoint, absorbing square-root rounding.
const ARRIVE_EPSILON: Fixed = Fixed::from_bits(1 << 16);

/// What stopped a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocked {
    /// Blocked terrain or the map border.
    Terrain,
    /// A ground unit.
    Unit(UnitId),
}

/// Move `from` toward `to` by at most `speed`.
///
/// Snaps onto the target when it is within `speed`, so a straight move of
/// distance `d` takes `ceil(d / speed)` steps. Returns the new position and
/// whether it is the target.
#[must_use]
pub fn step_toward(from: Vec2Fixed, to: Point, speed: Fixed) -> (Vec2Fixed, bool) {
    let target = Vec2Fixed::from_point(to);
    let delta = target - from;
    let dist = delta.length();
    if dist <= speed + ARRIVE_EPSILON {
        return (target, true);
    }
    (from + delta.scale(speed / dist), false)
}

/// Turn toward the direction of `delta`. Turning never holds back movement.
pub fn face_motion(m: &mut UnitMovement, delta: Vec2Fixed) {
    if delta == Vec2Fixed::ZERO {
        m.flags.set(MoveFlags::TURNING, false);
        return;
    }
    let target = Heading::from_delta(delta.x.to_bits(), delta.y.to_bits());
    m.heading = m.heading.turn_toward(target, m.turn_rate);
    m.flags.set(MoveFlags::TURNING, m.heading != target);
}

/// Check whether `unit` may stand at `exact`.
///
/// A move that keeps the unit's pixel box unchanged never collides, so a
/// unit already overlapping something can still settle.
pub fn blocked_at(
    world: &World,
    unit: &Unit,
    exact: Vec2Fixed,
    check_units: bool,
) -> Result<Option<Blocked>> {
    let bbox = unit.extents.bbox_at(exact.to_point());
    if bbox == unit.bbox() {
        return Ok(None);
    }
    if world.terrain_blocked(unit, &bbox) {
        return Ok(Some(Blocked::Terrain));
    }
    if check_units {
        if let Some(other) = world.unit_blocker(unit, bbox)? {
            return Ok(Some(Blocked::Unit(other)));
        }
    }
    Ok(None)
}

/// Commit a move and turn toward it.
pub fn commit(world: &mut World, id: UnitId, exact: Vec2Fixed) -> Result<()> {
    let before = world.unit(id)?.movement.exact;
    world.place(id, exact)?;
    face_motion(&mut world.unit_mut(id)?.movement, exact - before);
    Ok(())
}

/// Steer toward the next waypoint.
pub fn follow_path(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    if has_new_order(unit) {
        return Ok(Step::Continue(MovementState::NewTarget));
    }
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::FollowPath));
    }

    let m = &unit.movement;
    let (next, arrived) = step_toward(m.exact, m.next_waypoint, m.speed);
    match blocked_at(world, unit, next, true)? {
        Some(Blocked::Terrain) => {
            world
                .unit_mut(id)?
                .movement
                .flags
                .set(MoveFlags::COLLIDED, true);
            return Ok(Step::Continue(MovementState::FixTerrain));
        }
        Some(Blocked::Unit(other)) => {
            let m = &mut world.unit_mut(id)?.movement;
            m.blocker = Some(other);
            m.flags.set(MoveFlags::COLLIDED, true);
            if let Some(path) = world.path_mut_of(id)? {
                path.last_blocker = Some(other);
            }
            return Ok(Step::Continue(MovementState::FixCollision));
        }
        None => {}
    }

    commit(world, id, next)?;
    if arrived {
        waypoint_reached(world, id)
    } else {
        Ok(Step::Yield(MovementState::FollowPath))
    }
}

/// The unit stands on its current waypoint: move on to the next one or end the leg.
pub fn waypoint_reached(world: &mut World, id: UnitId) -> Result<Step> {
    let Some(pid) = world.unit(id)?.movement.path else {
        // Direct move without a path.
        return Ok(Step::Continue(MovementState::AtMoveTarget));
    };
    let next = {
        let path = world.paths.get_mut(pid)?;
        if path.advance_waypoint() {
            path.current_waypoint()
        } else {
            None
        }
    };
    match next {
        Some(waypoint) => {
            world.unit_mut(id)?.movement.next_waypoint = waypoint;
            Ok(Step::Yield(MovementState::FollowPath))
        }
        None => finish_leg(world, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_point(Point::new(x, y))
    }

    #[test]
    fn test_step_snaps_within_speed() {
        let (p, arrived) = step_toward(v(0, 0), Point::new(3, 0), Fixed::from_num(4));
        assert!(arrived);
        assert_eq!(p, v(3, 0));
    }

    #[test]
    fn test_step_count_is_ceil_of_distance_over_speed() {
        let speed = Fixed::from_num(3);
        for (dx, dy, expected) in [(10, 0, 4), (9, 0, 3), (30, 40, 17), (7, 7, 4)] {
            let mut pos = v(0, 0);
            let mut steps = 0;
            loop {
                steps += 1;
                let (next, arrived) = step_toward(pos, Point::new(dx, dy), speed);
                pos = next;
                if arrived {
                    break;
                }
                assert!(steps < 100);
            }
            assert_eq!(steps, expected, "({dx}, {dy})");
            assert_eq!(pos.to_point(), Point::new(dx, dy));
        }
    }

    #[test]
    fn test_heading_turns_gradually() {
        let mut arena = crate::units::UnitArena::with_capacity(1);
        let id = arena
            .spawn(&crate::units::UnitSpec::ground(Point::new(0, 0), 4, Fixed::ONE))
            .unwrap();
        let mut m = arena.get(id).unwrap().movement.clone();
        m.turn_rate = 16;
        // Facing north, moving south.
        face_motion(&mut m, v(0, 5));
        assert_eq!(m.heading, Heading(240));
        assert!(m.flags.contains(MoveFlags::TURNING));
        for _ in 0..7 {
            face_motion(&mut m, v(0, 5));
        }
        assert_eq!(m.heading, Heading(128));
        assert!(!m.flags.contains(MoveFlags::TURNING));
    }
}
