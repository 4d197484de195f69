//! Per-unit movement state machine.
//!
//! Each unit carries a [`MovementState`]. Once per tick [`advance`] runs
//! the current state's transition function, which either hands over to
//! another state within the same tick ([`Step::Continue`]) or ends the
//! unit's tick ([`Step::Yield`]). A unit makes at most
//! `max_transitions_per_tick` transitions and integrates its position at
//! most once per tick.
//!
//! The states are grouped by concern:
//!
//! - [`classify`]: dispatch on unit type (hidden, burrowed, turret, flyer,
//!   lifted building, dormant building)
//! - [`legal`]: getting a unit out of an illegal overlap
//! - [`planning`]: picking up orders, path planning and arrival
//! - [`motion`]: following waypoints and detecting collisions
//! - [`resolve`]: choosing and executing a collision strategy

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::units::{MoveFlags, UnitFlags, UnitId};
use crate::world::World;

pub mod classify;
pub mod legal;
pub mod motion;
pub mod planning;
pub mod resolve;

/// Named movement states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementState {
    /// Freshly spawned or reclassified; picks a sub-machine.
    #[default]
    Init,
    /// Inside a transport; off the field.
    Hidden,
    /// Burrowed in place.
    Burrowed,
    /// Mounted on a parent unit.
    Turret,
    /// Airborne and idle.
    Flyer,
    /// Airborne and moving straight to the destination.
    FlyerMove,
    /// Lifted-off building.
    LiftedBuilding,
    /// Cannot move on its own.
    Dormant,
    /// Checks whether the footprint overlaps something it must not.
    CheckIllegal,
    /// Walks to the nearest legal position.
    MoveToLegal,
    /// Waits for a moving unit to leave the footprint.
    WaitLegal,
    /// Stationary and legal.
    AtRest,
    /// Picks up a new order.
    NewTarget,
    /// Plans a route to the destination.
    StartPath,
    /// Steers along the current waypoints.
    FollowPath,
    /// Plans the next short leg.
    NextLeg,
    /// A leg ended short of its target.
    PartialArrival,
    /// A unit blocked the last move; pick a strategy.
    FixCollision,
    /// Waits for a blocker to move on.
    WaitFree,
    /// Sidesteps a blocker.
    SlideFree,
    /// Pushes through a blocker at reduced speed.
    ForceMoveFree,
    /// Replans the leg around resting units.
    RetryPath,
    /// Replans the leg around moving units too.
    RepathMovers,
    /// Terrain blocked the last move; pick a slide direction.
    FixTerrain,
    /// Slides along a terrain edge.
    TerrainSlide,
    /// Gives up on the destination.
    FailedPath,
    /// Gave up; waits for a new order.
    Immovable,
    /// Arrived.
    AtMoveTarget,
    /// Turns to face the target unit after arriving.
    TurnToFace,
    /// Taken out of the simulation.
    Removed,
}

impl MovementState {
    /// Whether the unit is travelling or about to.
    #[must_use]
    pub const fn is_in_motion(self) -> bool {
        matches!(
            self,
            Self::FlyerMove
                | Self::MoveToLegal
                | Self::NewTarget
                | Self::StartPath
                | Self::FollowPath
                | Self::NextLeg
                | Self::PartialArrival
                | Self::FixCollision
                | Self::WaitFree
                | Self::SlideFree
                | Self::ForceMoveFree
                | Self::RetryPath
                | Self::RepathMovers
                | Self::FixTerrain
                | Self::TerrainSlide
        )
    }

    /// Whether the unit drives its own ground movement (and sits in the unit finder).
    #[must_use]
    pub const fn is_grounded(self) -> bool {
        !matches!(
            self,
            Self::Init
                | Self::Hidden
                | Self::Burrowed
                | Self::Turret
                | Self::Flyer
                | Self::FlyerMove
                | Self::LiftedBuilding
                | Self::Removed
        )
    }
}

/// Outcome of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the next state in the same tick.
    Continue(MovementState),
    /// End the unit's tick in this state.
    Yield(MovementState),
}

/// How a unit collision is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionStrategy {
    /// The blocker is gone or no longer blocks.
    Proceed,
    /// The blocker is moving out of the way.
    Wait,
    /// Sidestep perpendicular to the motion.
    Slide,
    /// Replan around resting units.
    Replan,
    /// Replan around moving units too.
    ReplanWithMovers,
    /// Push through at reduced speed.
    ForceThrough,
    /// Too many failures; mark immovable.
    GiveUp,
}

/// Run one state's transition.
pub fn transition(state: MovementState, world: &mut World, id: UnitId) -> Result<Step> {
    use MovementState as S;
    match state {
        S::Init => classify::init(world, id),
        S::Hidden => classify::hidden(world, id),
        S::Burrowed => classify::burrowed(world, id),
        S::Turret => classify::turret(world, id),
        S::Flyer => classify::flyer(world, id),
        S::FlyerMove => classify::flyer_move(world, id),
        S::LiftedBuilding => classify::lifted_building(world, id),
        S::Dormant => classify::dormant(world, id),
        S::Removed => Ok(Step::Yield(S::Removed)),
        S::CheckIllegal => legal::check_illegal(world, id),
        S::MoveToLegal => legal::move_to_legal(world, id),
        S::WaitLegal => legal::wait_legal(world, id),
        S::AtRest => planning::at_rest(world, id),
        S::NewTarget => planning::new_target(world, id),
        S::StartPath => planning::start_path(world, id),
        S::NextLeg => planning::next_leg(world, id),
        S::PartialArrival => planning::partial_arrival(world, id),
        S::RetryPath => planning::retry_path(world, id, false),
        S::RepathMovers => planning::retry_path(world, id, true),
        S::FailedPath => planning::failed_path(world, id),
        S::Immovable => planning::immovable(world, id),
        S::AtMoveTarget => planning::at_move_target(world, id),
        S::TurnToFace => planning::turn_to_face(world, id),
        S::FollowPath => motion::follow_path(world, id),
        S::FixCollision => resolve::fix_collision(world, id),
        S::WaitFree => resolve::wait_free(world, id),
        S::SlideFree => resolve::slide_free(world, id),
        S::ForceMoveFree => resolve::force_move_free(world, id),
        S::FixTerrain => resolve::fix_terrain(world, id),
        S::TerrainSlide => resolve::terrain_slide(world, id),
    }
}

/// Advance one unit by one tick. Returns whether its position changed.
pub fn advance(world: &mut World, id: UnitId) -> Result<bool> {
    let limit = world.config.max_transitions_per_tick.max(1);
    let (start, mut state) = {
        let unit = world.unit_mut(id)?;
        let reclassify = classify::is_misclassified(unit);
        let disabled = unit.flags.contains(UnitFlags::DISABLED);
        let m = &mut unit.movement;
        m.stepped = false;
        m.flags.set(MoveFlags::COLLIDED, false);
        m.flags.set(MoveFlags::FORCED, false);
        m.flags.set(MoveFlags::ARRIVED, false);
        m.flags.set(MoveFlags::GAVE_UP, false);
        if disabled {
            m.velocity = crate::math::Vec2Fixed::ZERO;
            m.flags.set(MoveFlags::MOVING, false);
            return Ok(false);
        }
        if reclassify {
            m.state = MovementState::Init;
        }
        (m.position, m.state)
    };

    let mut yielded = false;
    for _ in 0..limit {
        let step = transition(state, world, id)?;
        let (next, stop) = match step {
            Step::Continue(next) => (next, false),
            Step::Yield(next) => (next, true),
        };
        world.unit_mut(id)?.movement.state = next;
        state = next;
        if stop {
            yielded = true;
            break;
        }
    }
    if !yielded {
        tracing::debug!(unit = ?id, ?state, "transition limit reached");
    }

    let unit = world.unit_mut(id)?;
    let m = &mut unit.movement;
    let moved = m.position != start;
    m.flags.set(MoveFlags::MOVING, moved);
    if !m.stepped {
        m.velocity = crate::math::Vec2Fixed::ZERO;
    }
    m.idle_ticks = if moved { 0 } else { m.idle_ticks.saturating_add(1) };
    Ok(moved)
}
