//! Scenario loading and setup.
//!
//! Scenarios describe a map, the units standing on it and the move orders
//! issued to them over time. They are stored as RON.

use std::path::Path;

use rts_pathing::config::NavConfig;
use rts_pathing::error::NavError;
use rts_pathing::math::{Fixed, Point, Rect};
use rts_pathing::simulation::{MoveOrder, Simulation};
use rts_pathing::units::{UnitFlags, UnitId, UnitSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// An order names a unit index the scenario does not define.
    #[error("Order {order} refers to unit {unit}, but only {count} units exist")]
    UnknownUnit {
        /// Index of the order.
        order: usize,
        /// Unit index it refers to.
        unit: usize,
        /// Units in the scenario.
        count: usize,
    },
    /// A unit has a non-positive size or speed.
    #[error("Unit {0} has an invalid size or speed")]
    InvalidUnit(usize),
    /// The resolver rejected the setup or a tick failed.
    #[error("Simulation error: {0}")]
    Simulation(#[from] NavError),
}

/// What kind of unit to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnitKind {
    /// Walks on the ground and collides.
    #[default]
    Ground,
    /// Flies straight to its destination.
    Flyer,
    /// Immobile footprint of the given pixel size.
    Building {
        /// Width in pixels.
        width: i32,
        /// Height in pixels.
        height: i32,
    },
}

fn default_half_size() -> i32 {
    8
}

fn default_speed() -> i32 {
    4
}

fn default_speed_divisor() -> i32 {
    1
}

/// A unit placed at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Kind of unit.
    #[serde(default)]
    pub kind: UnitKind,
    /// Center position in pixels.
    pub position: (i32, i32),
    /// Half of the square footprint, for ground units and flyers.
    #[serde(default = "default_half_size")]
    pub half_size: i32,
    /// Speed numerator, in pixels per tick.
    #[serde(default = "default_speed")]
    pub speed: i32,
    /// Speed denominator; `speed: 3, speed_divisor: 2` is 1.5 px/tick.
    #[serde(default = "default_speed_divisor")]
    pub speed_divisor: i32,
    /// Owning player.
    #[serde(default)]
    pub owner: u8,
}

impl UnitPlacement {
    /// A ground unit with the default size and speed.
    #[must_use]
    pub fn ground(x: i32, y: i32) -> Self {
        Self {
            kind: UnitKind::Ground,
            position: (x, y),
            half_size: default_half_size(),
            speed: default_speed(),
            speed_divisor: default_speed_divisor(),
            owner: 0,
        }
    }

    /// A building centered on `(x, y)`.
    #[must_use]
    pub fn building(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            kind: UnitKind::Building { width, height },
            ..Self::ground(x, y)
        }
    }

    /// Resolver spawn parameters.
    fn spec(&self, index: usize) -> Result<UnitSpec, ScenarioError> {
        let center = Point::new(self.position.0, self.position.1);
        match self.kind {
            UnitKind::Building { width, height } => {
                if width <= 0 || height <= 0 {
                    return Err(ScenarioError::InvalidUnit(index));
                }
                let left = center.x - width / 2;
                let top = center.y - height / 2;
                let footprint = Rect::new(left, top, left + width, top + height);
                Ok(UnitSpec::building(footprint).with_owner(self.owner))
            }
            UnitKind::Ground | UnitKind::Flyer => {
                if self.half_size <= 0 || self.speed <= 0 || self.speed_divisor <= 0 {
                    return Err(ScenarioError::InvalidUnit(index));
                }
                let speed = Fixed::from_num(self.speed) / Fixed::from_num(self.speed_divisor);
                let spec = UnitSpec::ground(center, self.half_size, speed).with_owner(self.owner);
                Ok(if self.kind == UnitKind::Flyer {
                    spec.with_flags(UnitFlags::FLYER)
                } else {
                    spec
                })
            }
        }
    }
}

/// Where an order sends a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTarget {
    /// A map position.
    Point(i32, i32),
    /// Contact with another scenario unit, by index.
    Unit(usize),
}

/// A move order issued at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOrder {
    /// Tick before which the order is issued.
    pub tick: u64,
    /// Index of the ordered unit.
    pub unit: usize,
    /// Destination.
    pub target: OrderTarget,
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Tile rows; `.` is walkable, `#` is not.
    pub map: Vec<String>,
    /// Resolver tunables.
    #[serde(default)]
    pub config: NavConfig,
    /// Units present at tick 0, in spawn order.
    pub units: Vec<UnitPlacement>,
    /// Orders, in any order.
    #[serde(default)]
    pub orders: Vec<ScheduledOrder>,
}

/// A scenario turned into a live simulation.
#[derive(Debug)]
pub struct LoadedScenario {
    /// The simulation.
    pub sim: Simulation,
    /// Resolver handle of each scenario unit, by index.
    pub units: Vec<UnitId>,
    /// Orders sorted by tick, then by position in the file.
    pub orders: Vec<ScheduledOrder>,
}

impl LoadedScenario {
    /// Issue every order scheduled for the current tick.
    pub fn issue_due_orders(&mut self) -> Result<usize, ScenarioError> {
        let now = self.sim.get_tick();
        let mut issued = 0;
        for order in self.orders.iter().filter(|o| o.tick == now) {
            let unit = self.units[order.unit];
            let target = match order.target {
                OrderTarget::Point(x, y) => MoveOrder::Point(Point::new(x, y)),
                OrderTarget::Unit(other) => MoveOrder::Unit(self.units[other]),
            };
            self.sim.set_move_target(unit, target)?;
            issued += 1;
        }
        Ok(issued)
    }

    /// Tick of the last scheduled order.
    #[must_use]
    pub fn last_order_tick(&self) -> u64 {
        self.orders.last().map_or(0, |o| o.tick)
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Serialize to pretty RON.
    #[must_use]
    pub fn to_ron_string(&self) -> String {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap_or_default()
    }

    /// Resolve a built-in scenario name or load a RON file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match name_or_path {
            "head_on" => Ok(Self::head_on()),
            "detour" => Ok(Self::detour()),
            "crowd" => Ok(Self::crowd(160)),
            path => Self::load(path),
        }
    }

    /// Check unit and order references.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let count = self.units.len();
        for (i, placement) in self.units.iter().enumerate() {
            placement.spec(i)?;
        }
        for (i, order) in self.orders.iter().enumerate() {
            let target = match order.target {
                OrderTarget::Unit(u) => Some(u),
                OrderTarget::Point(..) => None,
            };
            for unit in std::iter::once(order.unit).chain(target) {
                if unit >= count {
                    return Err(ScenarioError::UnknownUnit { order: i, unit, count });
                }
            }
        }
        Ok(())
    }

    /// Build the simulation and spawn every unit.
    pub fn instantiate(&self) -> Result<LoadedScenario, ScenarioError> {
        self.validate()?;
        let capacity = self.units.len().max(1);
        let mut sim = Simulation::from_rows(&self.map, self.config.clone(), capacity)?;
        let units = self
            .units
            .iter()
            .enumerate()
            .map(|(i, placement)| Ok(sim.spawn_unit(&placement.spec(i)?)?))
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let mut orders = self.orders.clone();
        orders.sort_by_key(|o| o.tick);

        tracing::debug!(
            scenario = %self.name,
            units = units.len(),
            orders = orders.len(),
            "Scenario instantiated"
        );
        Ok(LoadedScenario { sim, units, orders })
    }

    /// Two units walking through each other's start along one row.
    #[must_use]
    pub fn head_on() -> Self {
        Self {
            name: "head_on".to_string(),
            description: "Two walkers meeting head-on in an open field".to_string(),
            map: open_rows(12, 5),
            config: NavConfig::default(),
            units: vec![UnitPlacement::ground(64, 80), UnitPlacement::ground(320, 80)],
            orders: vec![
                ScheduledOrder {
                    tick: 1,
                    unit: 0,
                    target: OrderTarget::Point(340, 80),
                },
                ScheduledOrder {
                    tick: 1,
                    unit: 1,
                    target: OrderTarget::Point(44, 80),
                },
            ],
        }
    }

    /// One walker routed around a building.
    #[must_use]
    pub fn detour() -> Self {
        Self {
            name: "detour".to_string(),
            description: "A walker going around a 4x4 tile building".to_string(),
            map: open_rows(16, 12),
            config: NavConfig::default(),
            units: vec![
                UnitPlacement::building(256, 192, 128, 128),
                UnitPlacement::ground(100, 192),
            ],
            orders: vec![ScheduledOrder {
                tick: 1,
                unit: 1,
                target: OrderTarget::Point(420, 192),
            }],
        }
    }

    /// `count` walkers packed on the left, all sent across the map at once.
    #[must_use]
    pub fn crowd(count: usize) -> Self {
        let columns = 16;
        let mut units = Vec::with_capacity(count);
        let mut orders = Vec::with_capacity(count);
        for i in 0..count {
            let (col, row) = ((i % columns) as i32, (i / columns) as i32);
            units.push(UnitPlacement::ground(40 + col * 24, 40 + row * 24));
            orders.push(ScheduledOrder {
                tick: 1,
                unit: i,
                target: OrderTarget::Point(1600, 40 + row * 24),
            });
        }
        let height = (count / columns + 4).max(32);
        Self {
            name: format!("crowd_{count}"),
            description: "A crowd planning paths in the same tick".to_string(),
            map: open_rows(64, height),
            config: NavConfig::default(),
            units,
            orders,
        }
    }
}

fn open_rows(width: usize, height: usize) -> Vec<String> {
    (0..height).map(|_| ".".repeat(width)).collect()
}
