//! Fixed-timestep driver for the movement resolver.
//!
//! [`Simulation`] is the surface the order layer talks to: it spawns and
//! removes units, accepts move orders and advances every unit once per
//! tick in slot order.
//!
//! # Determinism
//!
//! - No floating-point math (exact positions use [`Fixed`](crate::math::Fixed))
//! - No randomness
//! - Units advance in stable slot order
//! - Same inputs always produce the same [`state_hash`](Simulation::state_hash)
//!
//! # Example
//!
//! ```
//! use rts_pathing::config::NavConfig;
//! use rts_pathing::math::{Fixed, Point};
//! use rts_pathing::simulation::{MoveOrder, Simulation};
//! use rts_pathing::units::UnitSpec;
//!
//! let mut sim = Simulation::from_rows(&["......", "......"], NavConfig::default(), 16).unwrap();
//! let unit = sim
//!     .spawn_unit(&UnitSpec::ground(Point::new(16, 16), 8, Fixed::from_num(4)))
//!     .unwrap();
//! sim.set_move_target(unit, MoveOrder::Point(Point::new(150, 40))).unwrap();
//!
//! for _ in 0..60 {
//!     sim.tick().unwrap();
//! }
//! let status = sim.status(unit).unwrap();
//! assert!(status.at_target);
//! assert_eq!(status.position, Point::new(150, 40));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::NavConfig;
use crate::error::Result;
use crate::map::GameMap;
use crate::math::{Heading, Point};
use crate::movement::{self, MovementState};
use crate::terrain::TileGrid;
use crate::units::{MoveFlags, Unit, UnitFlags, UnitId, UnitSpec};
use crate::world::{SearchCounters, World};

/// What a unit is asked to move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOrder {
    /// A map position; clamped onto the map.
    Point(Point),
    /// Contact with another unit's footprint.
    Unit(UnitId),
}

/// Status bits the order layer reads back once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Movement state.
    pub state: MovementState,
    /// Pixel position.
    pub position: Point,
    /// Facing.
    pub heading: Heading,
    /// Position changed in the last tick.
    pub moving: bool,
    /// The last order's destination has been reached.
    pub at_target: bool,
    /// Pathfinding gave up on the last order.
    pub immovable: bool,
    /// A collision was detected in the last tick.
    pub collided: bool,
    /// Failed collision resolutions for the current order.
    pub retries: u8,
}

impl UnitStatus {
    fn of(unit: &Unit) -> Self {
        let m = &unit.movement;
        Self {
            state: m.state,
            position: m.position,
            heading: m.heading,
            moving: m.flags.contains(MoveFlags::MOVING),
            at_target: m.flags.contains(MoveFlags::AT_TARGET),
            immovable: m.flags.contains(MoveFlags::IMMOVABLE),
            collided: m.flags.contains(MoveFlags::COLLIDED),
            retries: m.retries,
        }
    }
}

/// Events generated during a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Units whose position changed.
    pub moved: Vec<UnitId>,
    /// Units that reached their destination this tick.
    pub arrived: Vec<UnitId>,
    /// Units that were marked immovable this tick.
    pub stuck: Vec<UnitId>,
    /// Search work performed.
    pub searches: SearchCounters,
}

/// The movement simulation.
#[derive(Debug)]
pub struct Simulation {
    world: World,
}

impl Simulation {
    /// Create a simulation over `map` holding at most `unit_capacity` units.
    #[must_use]
    pub fn new(map: GameMap, config: NavConfig, unit_capacity: usize) -> Self {
        Self {
            world: World::new(map, config, unit_capacity),
        }
    }

    /// Build the map from `.`/`#` rows, using the configured region size.
    pub fn from_rows<S: AsRef<str>>(
        rows: &[S],
        config: NavConfig,
        unit_capacity: usize,
    ) -> Result<Self> {
        let map = GameMap::from_tiles(TileGrid::from_rows(rows)?, config.region_tiles)?;
        Ok(Self::new(map, config, unit_capacity))
    }

    /// Current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.world.tick
    }

    /// The map.
    #[must_use]
    pub fn map(&self) -> &GameMap {
        &self.world.map
    }

    /// Tunables in use.
    #[must_use]
    pub fn config(&self) -> &NavConfig {
        &self.world.config
    }

    /// Full resolver state, for inspection.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Live units in slot order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.world.units.iter()
    }

    /// Live unit behind a handle.
    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.world.unit(id)
    }

    /// Status bits of a unit.
    pub fn status(&self, id: UnitId) -> Result<UnitStatus> {
        Ok(UnitStatus::of(self.world.unit(id)?))
    }

    /// Add a unit. It is classified and indexed on its first advance.
    pub fn spawn_unit(&mut self, spec: &UnitSpec) -> Result<UnitId> {
        let id = self.world.units.spawn(spec)?;
        tracing::trace!(unit = ?id, position = ?spec.position, "spawned unit");
        Ok(id)
    }

    /// Take a unit out: frees its path and its spatial index entry.
    ///
    /// References to it held by other units become stale and read as "no unit".
    pub fn remove_unit(&mut self, id: UnitId) -> Result<()> {
        self.world.release_path(id)?;
        if self.world.finder.contains(id) {
            self.world.finder.remove(id)?;
        }
        self.world.units.remove(id);
        tracing::trace!(unit = ?id, "removed unit");
        Ok(())
    }

    /// Issue a move order. Takes effect lazily on the unit's next advance.
    pub fn set_move_target(&mut self, id: UnitId, order: MoveOrder) -> Result<()> {
        let (destination, target_unit) = match order {
            MoveOrder::Point(p) => (self.world.map.tiles().clamp_point(p), None),
            MoveOrder::Unit(target) => (self.world.unit(target)?.position(), Some(target)),
        };
        let m = &mut self.world.unit_mut(id)?.movement;
        m.destination = destination;
        m.target_unit = target_unit;
        m.order_serial = m.order_serial.wrapping_add(1);
        Ok(())
    }

    /// Replace a unit's classification flags (burrow, load, lift off, ...).
    /// The unit is reclassified on its next advance.
    pub fn set_unit_flags(&mut self, id: UnitId, flags: UnitFlags) -> Result<()> {
        self.world.unit_mut(id)?.flags = flags;
        Ok(())
    }

    /// Advance a single unit by one tick. Returns whether it moved.
    pub fn advance(&mut self, id: UnitId) -> Result<bool> {
        movement::advance(&mut self.world, id)
    }

    /// Advance every unit once, in slot order.
    ///
    /// # Errors
    ///
    /// A structural violation stops the tick where it happened and is
    /// returned; units after the failing one are not advanced.
    pub fn tick(&mut self) -> Result<TickEvents> {
        let mut events = TickEvents::default();
        self.world.counters = SearchCounters::default();

        for id in self.world.units.ids() {
            let moved = match movement::advance(&mut self.world, id) {
                Ok(moved) => moved,
                Err(err) => {
                    tracing::error!(tick = self.world.tick, unit = ?id, error = %err, "tick aborted");
                    return Err(err);
                }
            };
            let after = self.world.unit(id)?.movement.flags;
            if moved {
                events.moved.push(id);
            }
            if after.contains(MoveFlags::ARRIVED) {
                events.arrived.push(id);
            }
            if after.contains(MoveFlags::GAVE_UP) {
                events.stuck.push(id);
            }
        }

        #[cfg(feature = "debug-validation")]
        self.validate()?;

        events.searches = self.world.counters;
        self.world.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.world.tick, state_hash = hash, "Simulation state hash");
        }

        Ok(events)
    }

    /// Check that every grounded unit is indexed under its current box.
    #[cfg(feature = "debug-validation")]
    fn validate(&self) -> Result<()> {
        for unit in self.world.units.iter() {
            let state = unit.movement.state;
            if state.is_grounded() && state != MovementState::Init {
                match self.world.finder.bbox(unit.id) {
                    Some(bbox) if bbox == unit.bbox() => {}
                    _ => return Err(crate::error::NavError::NotIndexed(unit.id)),
                }
            }
        }
        Ok(())
    }

    /// Hash of the full movement state, for desync detection.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.world.tick.hash(&mut hasher);
        self.world.units.len().hash(&mut hasher);
        for unit in self.world.units.iter() {
            unit.hash(&mut hasher);
            if let Ok(Some(path)) = self.world.path_of(unit.id) {
                path.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}
