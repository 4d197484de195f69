//! Recovering from a footprint that overlaps terrain or another unit.
//!
//! A unit can end up overlapping something after being placed, unloaded or
//! reclassified. If only moving units are in the way it waits for them to
//! leave; otherwise it walks, ignoring collisions, to the nearest position
//! where its box fits.

use super::motion::{commit, step_toward};
use super::{MovementState, Step};
use crate::error::Result;
use crate::math::{Point, Rect};
use crate::units::{Unit, UnitId};
use crate::world::World;

/// Ring spacing of the nearest-legal search, in pixels.
const LEGAL_RING_STEP: i32 = 8;

const RING_DIRECTIONS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    None,
    MoversOnly,
    Solid,
}

fn overlap(world: &World, unit: &Unit, bbox: Rect) -> Result<Overlap> {
    if world.map.rect_collides(&bbox) {
        return Ok(Overlap::Solid);
    }
    let mut found = Overlap::None;
    world.finder.for_each_in_rect(bbox, |other_id, _| {
        let Some(other) = world.units.get(other_id) else {
            return Ok(true);
        };
        if World::blocks(unit, other) {
            if other.is_moving() {
                found = Overlap::MoversOnly;
            } else {
                found = Overlap::Solid;
                return Ok(false);
            }
        }
        Ok(true)
    })?;
    Ok(found)
}

/// Nearest center within `radius` where the unit's box is clear of terrain
/// and of every blocking unit.
pub fn nearest_legal(world: &World, unit: &Unit, radius: i32) -> Result<Option<Point>> {
    let origin = unit.position();
    let mut r = LEGAL_RING_STEP;
    while r <= radius {
        for (dx, dy) in RING_DIRECTIONS {
            let p = Point::new(origin.x + dx * r, origin.y + dy * r);
            if overlap(world, unit, unit.extents.bbox_at(p))? == Overlap::None {
                return Ok(Some(p));
            }
        }
        r += LEGAL_RING_STEP;
    }
    Ok(None)
}

fn settle(world: &mut World, id: UnitId, patient: bool) -> Result<Step> {
    let unit = world.unit(id)?;
    let found = overlap(world, unit, unit.bbox())?;
    match found {
        Overlap::None => {
            world.unit_mut(id)?.movement.legal_target = None;
            Ok(Step::Continue(MovementState::AtRest))
        }
        Overlap::MoversOnly if patient => Ok(Step::Yield(MovementState::WaitLegal)),
        Overlap::MoversOnly | Overlap::Solid => {
            let radius = world.config.legal_search_radius;
            match nearest_legal(world, unit, radius)? {
                Some(p) => {
                    tracing::debug!(unit = ?id, from = ?unit.position(), to = ?p, "moving to legal position");
                    world.unit_mut(id)?.movement.legal_target = Some(p);
                    Ok(Step::Continue(MovementState::MoveToLegal))
                }
                None => {
                    tracing::debug!(unit = ?id, "no legal position nearby");
                    Ok(Step::Continue(MovementState::AtRest))
                }
            }
        }
    }
}

/// Check the current footprint.
pub fn check_illegal(world: &mut World, id: UnitId) -> Result<Step> {
    let step = settle(world, id, true)?;
    if step == Step::Yield(MovementState::WaitLegal) {
        let wait = world.config.legal_wait_ticks.max(1);
        world.unit_mut(id)?.movement.timer = wait;
    }
    Ok(step)
}

/// Wait for moving units to clear the footprint; once the countdown runs
/// out, treat them like resting ones.
pub fn wait_legal(world: &mut World, id: UnitId) -> Result<Step> {
    let m = &mut world.unit_mut(id)?.movement;
    m.timer = m.timer.saturating_sub(1);
    let patient = m.timer > 0;
    settle(world, id, patient)
}

/// Walk straight to the legal position, ignoring collisions.
pub fn move_to_legal(world: &mut World, id: UnitId) -> Result<Step> {
    let unit = world.unit(id)?;
    let Some(target) = unit.movement.legal_target else {
        return Ok(Step::Continue(MovementState::CheckIllegal));
    };
    if unit.movement.stepped {
        return Ok(Step::Yield(MovementState::MoveToLegal));
    }
    let (next, arrived) = step_toward(unit.movement.exact, target, unit.movement.speed);
    commit(world, id, next)?;
    if arrived {
        world.unit_mut(id)?.movement.legal_target = None;
        return Ok(Step::Continue(MovementState::CheckIllegal));
    }
    Ok(Step::Yield(MovementState::MoveToLegal))
}
