//! Unit-type dispatch and the sub-machines that never touch ground pathing.

use super::motion::{face_motion, step_toward};
use super::planning::take_order;
use super::{MovementState, Step};
use crate::error::Result;
use crate::units::{MoveFlags, Unit, UnitFlags, UnitId};
use crate::world::World;

/// Entry state of the sub-machine matching the unit's current flags.
#[must_use]
pub fn classification(unit: &Unit) -> MovementState {
    let f = unit.flags;
    if f.contains(UnitFlags::HIDDEN) {
        MovementState::Hidden
    } else if f.contains(UnitFlags::BURROWED) {
        MovementState::Burrowed
    } else if f.contains(UnitFlags::TURRET) {
        MovementState::Turret
    } else if f.contains(UnitFlags::LIFTED) {
        MovementState::LiftedBuilding
    } else if f.contains(UnitFlags::FLYER) {
        MovementState::Flyer
    } else if !unit.is_mobile() {
        MovementState::Dormant
    } else {
        MovementState::CheckIllegal
    }
}

/// Whether the unit's flags changed under it since it was classified.
#[must_use]
pub fn is_misclassified(unit: &Unit) -> bool {
    use MovementState as S;
    let state = unit.movement.state;
    let expected = classification(unit);
    match state {
        S::Init | S::Removed => false,
        S::FlyerMove => !matches!(expected, S::Flyer | S::LiftedBuilding),
        S::Hidden | S::Burrowed | S::Turret | S::Flyer | S::LiftedBuilding | S::Dormant => {
            state != expected
        }
        _ => expected != S::CheckIllegal,
    }
}

/// Pick the sub-machine and put the unit in or out of the spatial index.
pub fn init(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    let next = classification(unit);
    let bbox = unit.bbox();
    let on_ground = matches!(next, MovementState::CheckIllegal | MovementState::Dormant);

    if on_ground {
        if !world.finder.contains(id) {
            world.finder.insert(id, bbox);
        }
    } else {
        if world.finder.contains(id) {
            world.finder.remove(id)?;
        }
        world.release_path(id)?;
    }

    let m = &mut world.unit_mut(id)?.movement;
    m.no_collision_box = None;
    m.flags.set(MoveFlags::TURNING, false);
    tracing::trace!(unit = ?id, state = ?next, "classified");
    Ok(Step::Continue(next))
}

/// Hidden units stay put until their flag clears.
pub fn hidden(_world: &mut World, _id: UnitId) -> Result<Step> {
    Ok(Step::Yield(MovementState::Hidden))
}

/// Burrowed units stay put until their flag clears.
pub fn burrowed(_world: &mut World, _id: UnitId) -> Result<Step> {
    Ok(Step::Yield(MovementState::Burrowed))
}

/// Follow the parent's position and facing. A missing parent leaves the
/// turret where it is.
pub fn turret(world: &mut World, id: UnitId) -> Result<Step> {
    let parent = world
        .unit(id)?
        .attached_to
        .and_then(|p| world.units.get(p))
        .map(|p| (p.movement.exact, p.movement.heading));

    if let Some((exact, heading)) = parent {
        let m = &mut world.unit_mut(id)?.movement;
        m.velocity = exact - m.exact;
        m.exact = exact;
        m.position = exact.to_point();
        m.heading = heading;
        m.stepped = true;
    }
    Ok(Step::Yield(MovementState::Turret))
}

/// Idle flyer; any order starts a straight flight.
pub fn flyer(world: &mut World, id: UnitId) -> Result<Step> {
    if take_order(world, id)? {
        return Ok(Step::Continue(MovementState::FlyerMove));
    }
    Ok(Step::Yield(MovementState::Flyer))
}

/// Idle lifted building; moves like a flyer.
pub fn lifted_building(world: &mut World, id: UnitId) -> Result<Step> {
    if take_order(world, id)? {
        return Ok(Step::Continue(MovementState::FlyerMove));
    }
    Ok(Step::Yield(MovementState::LiftedBuilding))
}

/// Fly straight to the destination; nothing collides in the air.
pub fn flyer_move(world: &mut World, id: UnitId) -> Result<Step> {
    take_order(world, id)?;
    let unit = world.unit(id)?;
    let resting = classification(unit);
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::FlyerMove));
    }
    let goal = world.goal_point(unit);
    let (next, arrived) = step_toward(unit.movement.exact, goal, unit.movement.speed);

    let delta = next - unit.movement.exact;
    world.place(id, next)?;
    let m = &mut world.unit_mut(id)?.movement;
    face_motion(m, delta);
    if arrived {
        m.mark_arrived();
        return Ok(Step::Yield(resting));
    }
    Ok(Step::Yield(MovementState::FlyerMove))
}

/// Immobile units refuse orders by reporting themselves immovable.
pub fn dormant(world: &mut World, id: UnitId) -> Result<Step> {
    if take_order(world, id)? {
        world.unit_mut(id)?.movement.mark_immovable();
    }
    Ok(Step::Yield(MovementState::Dormant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Fixed, Point, Rect};
    use crate::units::{UnitArena, UnitSpec};

    #[test]
    fn test_classification_order() {
        let mut arena = UnitArena::with_capacity(8);
        let spec = UnitSpec::ground(Point::new(50, 50), 8, Fixed::from_num(4));
        let cases = [
            (UnitFlags::empty(), MovementState::CheckIllegal),
            (UnitFlags::FLYER, MovementState::Flyer),
            (UnitFlags::HIDDEN.union(UnitFlags::FLYER), MovementState::Hidden),
            (UnitFlags::BURROWED, MovementState::Burrowed),
            (UnitFlags::TURRET, MovementState::Turret),
            (UnitFlags::BUILDING.union(UnitFlags::LIFTED), MovementState::LiftedBuilding),
        ];
        for (flags, expected) in cases {
            let id = arena.spawn(&spec.with_flags(flags)).unwrap();
            assert_eq!(classification(arena.get(id).unwrap()), expected, "{flags:?}");
        }
        let building = arena
            .spawn(&UnitSpec::building(Rect::new(0, 0, 64, 64)))
            .unwrap();
        assert_eq!(
            classification(arena.get(building).unwrap()),
            MovementState::Dormant
        );
    }

    #[test]
    fn test_flag_change_is_detected() {
        let mut arena = UnitArena::with_capacity(1);
        let id = arena
            .spawn(&UnitSpec::ground(Point::new(50, 50), 8, Fixed::from_num(4)))
            .unwrap();
        let unit = arena.get_mut(id).unwrap();
        unit.movement.state = MovementState::FollowPath;
        assert!(!is_misclassified(unit));
        unit.flags = UnitFlags::BURROWED;
        assert!(is_misclassified(unit));
        unit.movement.state = MovementState::Burrowed;
        assert!(!is_misclassified(unit));
    }
}
