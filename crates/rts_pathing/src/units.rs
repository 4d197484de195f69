//! Unit storage and per-unit movement data.
//!
//! Units live in a fixed-capacity arena addressed by slot index. Every
//! cross-reference (move target, remembered blocker, turret parent) is a
//! [`UnitId`] carrying the slot's generation, so a reference to a removed
//! unit is detectably stale instead of dangling.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::math::{Fixed, Heading, Point, Rect, Vec2Fixed};
use crate::movement::MovementState;
use crate::path::PathId;

/// Generation-checked handle to a unit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    index: u32,
    generation: u32,
}

impl UnitId {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation at the time the handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Static classification bits of a unit.
///
/// # Example
///
/// ```
/// use rts_pathing::units::UnitFlags;
///
/// let flags = UnitFlags::BUILDING.union(UnitFlags::LIFTED);
/// assert!(flags.contains(UnitFlags::LIFTED));
/// assert!(!flags.contains(UnitFlags::FLYER));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitFlags(u16);

impl UnitFlags {
    /// Air unit; never collides with ground units.
    pub const FLYER: Self = Self(1 << 0);
    /// Inside a transport or otherwise removed from the field.
    pub const HIDDEN: Self = Self(1 << 1);
    /// Burrowed in place.
    pub const BURROWED: Self = Self(1 << 2);
    /// Subunit mounted on a parent unit.
    pub const TURRET: Self = Self(1 << 3);
    /// Structure footprint.
    pub const BUILDING: Self = Self(1 << 4);
    /// Building currently lifted off; moves like a flyer.
    pub const LIFTED: Self = Self(1 << 5);
    /// Never blocks other units.
    pub const NO_COLLIDE: Self = Self(1 << 6);
    /// Walks through units of its own owner.
    pub const PASSES_ALLIES: Self = Self(1 << 7);
    /// Disabled (stasis, lockdown); does not advance.
    pub const DISABLED: Self = Self(1 << 8);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if all flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Union of flags.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags in `self` that are not in `other`.
    #[inline]
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

/// Dynamic movement status bits, read back by the order layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MoveFlags(u8);

impl MoveFlags {
    /// Position changed this tick.
    pub const MOVING: Self = Self(1 << 0);
    /// Heading has not caught up with the motion direction.
    pub const TURNING: Self = Self(1 << 1);
    /// A collision was detected this tick.
    pub const COLLIDED: Self = Self(1 << 2);
    /// Pathfinding gave up on the current destination.
    pub const IMMOVABLE: Self = Self(1 << 3);
    /// The destination has been reached.
    pub const AT_TARGET: Self = Self(1 << 4);
    /// Moving through other units at reduced speed.
    pub const FORCED: Self = Self(1 << 5);
    /// The destination was reached during the last advance.
    pub const ARRIVED: Self = Self(1 << 6);
    /// The unit gave up on its destination during the last advance.
    pub const GAVE_UP: Self = Self(1 << 7);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if all flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Set or clear `flag`.
    #[inline]
    pub fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

/// Footprint of a unit around its center, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extents {
    /// Pixels left of the center.
    pub left: i32,
    /// Pixels above the center.
    pub up: i32,
    /// Pixels right of the center.
    pub right: i32,
    /// Pixels below the center.
    pub down: i32,
}

impl Extents {
    /// Create extents.
    #[must_use]
    pub const fn new(left: i32, up: i32, right: i32, down: i32) -> Self {
        Self {
            left,
            up,
            right,
            down,
        }
    }

    /// Symmetric square footprint.
    #[must_use]
    pub const fn square(half: i32) -> Self {
        Self::new(half, half, half, half)
    }

    /// Bounding box with the center at `p`.
    #[must_use]
    pub const fn bbox_at(&self, p: Point) -> Rect {
        Rect::new(p.x - self.left, p.y - self.up, p.x + self.right, p.y + self.down)
    }

    /// Footprint width.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.left + self.right
    }

    /// Footprint height.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.up + self.down
    }
}

/// Per-unit movement record. Mutated only by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitMovement {
    /// Current state machine state.
    pub state: MovementState,
    /// Status bits.
    pub flags: MoveFlags,
    /// Exact position.
    pub exact: Vec2Fixed,
    /// Pixel position (floor of `exact`).
    pub position: Point,
    /// Displacement applied in the last tick.
    pub velocity: Vec2Fixed,
    /// Facing.
    pub heading: Heading,
    /// Top speed in pixels per tick.
    #[serde(with = "crate::math::fixed_serde")]
    pub speed: Fixed,
    /// Heading steps per tick.
    pub turn_rate: u8,
    /// Requested destination (clamped to the map).
    pub destination: Point,
    /// Unit whose footprint is the real goal, if any.
    pub target_unit: Option<UnitId>,
    /// Bumped on every new order; paths remember the value they serve.
    pub order_serial: u32,
    /// Order the state machine last picked up.
    pub served_serial: u32,
    /// Point currently steered toward.
    pub next_waypoint: Point,
    /// Path owned by this unit.
    pub path: Option<PathId>,
    /// Failed collision resolutions for the current destination.
    pub retries: u8,
    /// State-local countdown.
    pub timer: u8,
    /// Unit step used while sliding, in pixels.
    pub slide_step: Point,
    /// Ticks since the unit last changed position.
    pub idle_ticks: u32,
    /// Terrain-free box around the unit, valid while the bbox stays inside.
    pub no_collision_box: Option<Rect>,
    /// Where the previous best-effort leg ended.
    pub last_partial: Option<Point>,
    /// Unit that blocked the last move.
    pub blocker: Option<UnitId>,
    /// Legal position being walked to by `MoveToLegal`.
    pub legal_target: Option<Point>,
    /// Next short search treats moving units as obstacles.
    pub avoid_movers: bool,
    /// Position already integrated during the current advance.
    pub stepped: bool,
}

impl UnitMovement {
    /// Record arrival at the destination.
    pub fn mark_arrived(&mut self) {
        self.flags.set(MoveFlags::AT_TARGET, true);
        self.flags.set(MoveFlags::ARRIVED, true);
    }

    /// Record giving up on the destination.
    pub fn mark_immovable(&mut self) {
        self.flags.set(MoveFlags::IMMOVABLE, true);
        self.flags.set(MoveFlags::GAVE_UP, true);
    }

    fn at(position: Point, speed: Fixed, turn_rate: u8) -> Self {
        Self {
            state: MovementState::Init,
            flags: MoveFlags::empty(),
            exact: Vec2Fixed::from_point(position),
            position,
            velocity: Vec2Fixed::ZERO,
            heading: Heading::default(),
            speed,
            turn_rate,
            destination: position,
            target_unit: None,
            order_serial: 0,
            served_serial: 0,
            next_waypoint: position,
            path: None,
            retries: 0,
            timer: 0,
            slide_step: Point::default(),
            idle_ticks: 0,
            no_collision_box: None,
            last_partial: None,
            blocker: None,
            legal_target: None,
            avoid_movers: false,
            stepped: false,
        }
    }
}

/// Spawn parameters for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Initial center.
    pub position: Point,
    /// Footprint.
    pub extents: Extents,
    /// Top speed in pixels per tick.
    #[serde(with = "crate::math::fixed_serde")]
    pub speed: Fixed,
    /// Heading steps per tick.
    pub turn_rate: u8,
    /// Owning player.
    pub owner: u8,
    /// Classification.
    pub flags: UnitFlags,
    /// Parent for turrets.
    pub attached_to: Option<UnitId>,
}

impl UnitSpec {
    /// A ground unit with a square footprint.
    #[must_use]
    pub fn ground(position: Point, half_size: i32, speed: Fixed) -> Self {
        Self {
            position,
            extents: Extents::square(half_size),
            speed,
            turn_rate: 16,
            owner: 0,
            flags: UnitFlags::empty(),
            attached_to: None,
        }
    }

    /// A stationary building covering `rect`.
    #[must_use]
    pub fn building(rect: Rect) -> Self {
        let center = rect.center();
        Self {
            position: center,
            extents: Extents::new(
                center.x - rect.left,
                center.y - rect.top,
                rect.right - center.x,
                rect.bottom - center.y,
            ),
            speed: Fixed::ZERO,
            turn_rate: 0,
            owner: 0,
            flags: UnitFlags::BUILDING,
            attached_to: None,
        }
    }

    /// Replace the flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: UnitFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the owner.
    #[must_use]
    pub const fn with_owner(mut self, owner: u8) -> Self {
        self.owner = owner;
        self
    }
}

/// A unit as seen by the movement resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Own handle.
    pub id: UnitId,
    /// Owning player.
    pub owner: u8,
    /// Footprint.
    pub extents: Extents,
    /// Classification.
    pub flags: UnitFlags,
    /// Parent for turrets.
    pub attached_to: Option<UnitId>,
    /// Movement record.
    pub movement: UnitMovement,
}

impl Unit {
    fn from_spec(id: UnitId, spec: &UnitSpec) -> Self {
        Self {
            id,
            owner: spec.owner,
            extents: spec.extents,
            flags: spec.flags,
            attached_to: spec.attached_to,
            movement: UnitMovement::at(spec.position, spec.speed, spec.turn_rate),
        }
    }

    /// Current bounding box.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.extents.bbox_at(self.movement.position)
    }

    /// Pixel position.
    #[must_use]
    pub fn position(&self) -> Point {
        self.movement.position
    }

    /// Air units and lifted buildings.
    #[must_use]
    pub const fn is_flying(&self) -> bool {
        self.flags.intersects(UnitFlags::FLYER.union(UnitFlags::LIFTED))
    }

    /// Whether this unit occupies ground space at all.
    #[must_use]
    pub const fn occupies_ground(&self) -> bool {
        !self.is_flying()
            && !self.flags.intersects(
                UnitFlags::HIDDEN
                    .union(UnitFlags::BURROWED)
                    .union(UnitFlags::NO_COLLIDE)
                    .union(UnitFlags::TURRET),
            )
    }

    /// Whether `mover` may pass through this unit.
    #[must_use]
    pub fn is_ignored_by(&self, mover: &Unit) -> bool {
        if self.id == mover.id || !self.occupies_ground() || mover.is_flying() {
            return true;
        }
        mover.flags.contains(UnitFlags::PASSES_ALLIES) && mover.owner == self.owner
    }

    /// Whether the unit changed position or intends to.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.movement.state.is_in_motion()
    }

    /// Whether the unit can ever move on its own.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.movement.speed > Fixed::ZERO
            && !(self.flags.contains(UnitFlags::BUILDING) && !self.flags.contains(UnitFlags::LIFTED))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    unit: Option<Unit>,
}

/// Fixed-capacity unit pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    len: usize,
}

impl UnitArena {
    /// Create an empty arena that holds at most `capacity` units.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            len: 0,
        }
    }

    /// Maximum unit count.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live units.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no unit is alive.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever used (live or free).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Create a unit from a spec.
    pub fn spawn(&mut self, spec: &UnitSpec) -> Result<UnitId> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                generation: 0,
                unit: None,
            });
            (self.slots.len() - 1) as u32
        } else {
            return Err(NavError::UnitCapacityExceeded {
                capacity: self.capacity,
            });
        };

        let slot = &mut self.slots[index as usize];
        let id = UnitId {
            index,
            generation: slot.generation,
        };
        slot.unit = Some(Unit::from_spec(id, spec));
        self.len += 1;
        Ok(id)
    }

    /// Remove a unit; its handle and every copy of it become stale.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let unit = slot.unit.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(unit)
    }

    /// Live unit behind a handle.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.unit.as_ref())
    }

    /// Mutable live unit behind a handle.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.unit.as_mut())
    }

    /// Live unit in a slot regardless of generation.
    #[must_use]
    pub fn by_slot(&self, index: usize) -> Option<&Unit> {
        self.slots.get(index).and_then(|s| s.unit.as_ref())
    }

    /// Whether the handle refers to a live unit.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    /// Live handles in slot order, the simulation's stable iteration order.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.slots
            .iter()
            .filter_map(|s| s.unit.as_ref().map(|u| u.id))
            .collect()
    }

    /// Iterate live units in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter_map(|s| s.unit.as_ref())
    }
}
