//! Simulation and topology configuration
//!
//! Both documents are plain serde structs with defaults, loadable from JSON.
//! Validation runs once at startup; a topology that fails it never reaches
//! the simulation loop.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use super::types::{
    Direction, Footprint, Lane, Position, Rect, VehicleClass, DEFAULT_FOOTPRINT, MOVING_GAP,
    ROTATION_STEP, STOPPING_GAP,
};

/// How the spawner picks the intersection for each new vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionSelection {
    Uniform,
    RoundRobin,
}

/// How the spawner picks a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneWeighting {
    /// Each of the three lanes equally likely
    Uniform,
    /// 60% straight, the rest split between the two turning lanes
    StraightBiased,
}

/// Who picks the next green direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// Starvation-aware greedy selection, overridable one phase at a time
    Adaptive,
    /// All red until an operator names a direction
    Manual,
}

/// Signal timing constants, in simulated seconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTiming {
    pub seconds_per_vehicle: f32,
    pub min_green: u32,
    pub max_green: u32,
    pub yellow: u32,
    /// Phases a loaded direction may go unchosen before it is forced
    pub starvation_limit: u32,
    /// Neighbor queue depth at which a feeding lane is held red
    pub congestion_ceiling: usize,
    /// Green granted by a manual-mode override
    pub manual_green: u32,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            seconds_per_vehicle: 0.5,
            min_green: 1,
            max_green: 20,
            yellow: 1,
            starvation_limit: 2,
            congestion_ceiling: 5,
            manual_green: 10,
        }
    }
}

impl SignalTiming {
    /// Green seconds for `vehicles` queued vehicles
    pub fn green_for(&self, vehicles: usize) -> u32 {
        let raw = (vehicles as f32 * self.seconds_per_vehicle).round() as u32;
        raw.max(self.min_green).min(self.max_green)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Vehicles are only placed explicitly when false
    pub enabled: bool,
    pub interval_secs: f32,
    pub intersection_selection: IntersectionSelection,
    pub lane_weighting: LaneWeighting,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 0.25,
            intersection_selection: IntersectionSelection::Uniform,
            lane_weighting: LaneWeighting::Uniform,
        }
    }
}

/// Per-class overrides; missing values fall back to the class defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleClassConfig {
    pub class: VehicleClass,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub footprint: Option<Footprint>,
}

fn default_true() -> bool {
    true
}

/// Resolved speed and size of an enabled vehicle class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProfile {
    pub class: VehicleClass,
    pub speed: f32,
    pub footprint: Footprint,
}

/// Top-level simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_rate: u32,
    pub startup_delay_secs: u32,
    pub simulation_time_secs: u32,
    pub stopping_gap: f32,
    pub moving_gap: f32,
    pub rotation_step: f32,
    pub timing: SignalTiming,
    pub spawn: SpawnConfig,
    pub controller_mode: ControllerMode,
    pub vehicle_classes: Vec<VehicleClassConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            startup_delay_secs: 5,
            simulation_time_secs: 300,
            stopping_gap: STOPPING_GAP,
            moving_gap: MOVING_GAP,
            rotation_step: ROTATION_STEP,
            timing: SignalTiming::default(),
            spawn: SpawnConfig::default(),
            controller_mode: ControllerMode::Adaptive,
            vehicle_classes: VehicleClass::ALL
                .iter()
                .map(|&class| VehicleClassConfig {
                    class,
                    enabled: true,
                    speed: None,
                    footprint: None,
                })
                .collect(),
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SimConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.tick_rate > 0, "tick_rate must be positive");
        ensure!(
            self.spawn.interval_secs > 0.0,
            "spawn interval must be positive"
        );
        ensure!(
            self.timing.min_green <= self.timing.max_green,
            "min_green ({}) exceeds max_green ({})",
            self.timing.min_green,
            self.timing.max_green
        );
        ensure!(
            self.timing.seconds_per_vehicle >= 0.0,
            "seconds_per_vehicle must not be negative"
        );
        ensure!(
            self.rotation_step > 0.0 && self.rotation_step <= 90.0,
            "rotation_step must be in (0, 90]"
        );
        ensure!(
            self.stopping_gap >= 0.0 && self.moving_gap >= 0.0,
            "gaps must not be negative"
        );
        for class in &self.vehicle_classes {
            if let Some(speed) = class.speed {
                ensure!(
                    speed.is_finite() && speed > 0.0,
                    "speed for {} must be positive",
                    class.class
                );
            }
        }
        ensure!(
            self.vehicle_classes.iter().any(|c| c.enabled),
            "at least one vehicle class must be enabled"
        );
        Ok(())
    }

    /// Enabled classes with their speed and footprint resolved.
    ///
    /// A configured footprint that is not usable is replaced by
    /// [`DEFAULT_FOOTPRINT`] and reported; the class stays enabled.
    pub fn class_profiles(&self) -> Vec<ClassProfile> {
        self.vehicle_classes
            .iter()
            .filter(|c| c.enabled)
            .map(|c| {
                let footprint = match c.footprint {
                    Some(footprint) if footprint.is_valid() => footprint,
                    Some(footprint) => {
                        warn!(
                            "Unusable footprint {:?} for {}; using default {:?}",
                            footprint, c.class, DEFAULT_FOOTPRINT
                        );
                        DEFAULT_FOOTPRINT
                    }
                    None => c.class.default_footprint(),
                };
                ClassProfile {
                    class: c.class,
                    speed: c.speed.unwrap_or_else(|| c.class.default_speed()),
                    footprint,
                }
            })
            .collect()
    }
}

/// One value per direction, spelled out for readable JSON
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionTable<T> {
    pub right: T,
    pub down: T,
    pub left: T,
    pub up: T,
}

impl<T: Copy> DirectionTable<T> {
    pub fn get(&self, direction: Direction) -> T {
        match direction {
            Direction::Right => self.right,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Up => self.up,
        }
    }
}

/// Static description of one intersection.
///
/// Geometry is relative to the intersection; `x_offset` is added to every x
/// coordinate when the intersection is built. Entry zones are absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntersectionConfig {
    pub name: String,
    #[serde(default)]
    pub x_offset: f32,
    /// Axis coordinate of the stop line for each inbound direction
    pub stop_lines: DirectionTable<f32>,
    /// Where the leading edge of the first queued vehicle halts on red
    pub default_stops: DirectionTable<f32>,
    /// Pivot used by right-turning vehicles
    pub midpoints: DirectionTable<Position>,
    /// Spawn point per lane (left turn, straight, right turn)
    pub spawn_points: DirectionTable<[Position; 3]>,
    pub allowed_spawn_directions: Vec<Direction>,
    /// Outbound heading -> name of the intersection reached that way
    #[serde(default)]
    pub neighbors: BTreeMap<Direction, String>,
    /// Inbound heading -> zone that hands a vehicle over to this intersection
    #[serde(default)]
    pub entry_zones: BTreeMap<Direction, Rect>,
}

/// Whole road layout: intersections, signal pairing and world bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub intersections: Vec<IntersectionConfig>,
    /// Direction whose left turn may run alongside each primary direction
    #[serde(default = "default_simultaneous")]
    pub simultaneous: BTreeMap<Direction, Direction>,
    /// Crossed vehicles leaving this area are removed
    pub bounds: Rect,
}

pub fn default_simultaneous() -> BTreeMap<Direction, Direction> {
    BTreeMap::from([
        (Direction::Right, Direction::Up),
        (Direction::Down, Direction::Right),
        (Direction::Left, Direction::Down),
        (Direction::Up, Direction::Left),
    ])
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::two_intersections()
    }
}

impl TopologyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology {}", path.display()))?;
        let topology: TopologyConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse topology {}", path.display()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Single intersection with the standard geometry and no neighbors
    pub fn single_intersection() -> Self {
        let mut intersection = standard_intersection("A", 0.0);
        intersection.allowed_spawn_directions = Direction::ALL.to_vec();
        Self {
            intersections: vec![intersection],
            simultaneous: default_simultaneous(),
            bounds: Rect::new(-100.0, -100.0, 1600.0, 1300.0),
        }
    }

    /// Two intersections side by side, A to the west of B, sharing a road
    pub fn two_intersections() -> Self {
        let mut a = standard_intersection("A", 0.0);
        a.allowed_spawn_directions = vec![Direction::Up, Direction::Down, Direction::Right];
        a.neighbors.insert(Direction::Right, "B".to_string());
        a.entry_zones
            .insert(Direction::Left, Rect::new(733.0, 411.0, 100.0, 200.0));

        let mut b = standard_intersection("B", 748.0);
        b.allowed_spawn_directions = vec![Direction::Up, Direction::Down, Direction::Left];
        b.neighbors.insert(Direction::Left, "A".to_string());
        b.entry_zones
            .insert(Direction::Right, Rect::new(470.0, 411.0, 100.0, 200.0));

        Self {
            intersections: vec![a, b],
            simultaneous: default_simultaneous(),
            bounds: Rect::new(-100.0, -100.0, 2400.0, 1300.0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.intersections.is_empty(),
            "topology must contain at least one intersection"
        );
        ensure!(self.bounds.is_valid(), "world bounds must have positive size");
        validate_pairing(&self.simultaneous)?;

        let mut names = HashSet::new();
        for intersection in &self.intersections {
            ensure!(
                names.insert(intersection.name.as_str()),
                "duplicate intersection name '{}'",
                intersection.name
            );
        }

        for intersection in &self.intersections {
            let name = &intersection.name;
            ensure!(
                !intersection.allowed_spawn_directions.is_empty(),
                "intersection '{}' allows no spawn directions",
                name
            );
            for (heading, neighbor) in &intersection.neighbors {
                ensure!(
                    names.contains(neighbor.as_str()),
                    "intersection '{}' names unknown neighbor '{}' to the {}",
                    name,
                    neighbor,
                    heading
                );
                ensure!(
                    neighbor != name,
                    "intersection '{}' lists itself as a neighbor",
                    name
                );
            }
            for (heading, zone) in &intersection.entry_zones {
                ensure!(
                    zone.is_valid(),
                    "entry zone {} of '{}' has no area",
                    heading,
                    name
                );
            }
            for direction in Direction::ALL {
                let stop_line = direction.project(intersection.stop_lines.get(direction));
                let default_stop = direction.project(intersection.default_stops.get(direction));
                ensure!(
                    default_stop <= stop_line,
                    "default stop for {} at '{}' lies beyond its stop line",
                    direction,
                    name
                );
            }
        }
        Ok(())
    }
}

/// The simultaneous pairing must be one 4-cycle over all directions
fn validate_pairing(pairing: &BTreeMap<Direction, Direction>) -> Result<()> {
    for direction in Direction::ALL {
        let Some(&partner) = pairing.get(&direction) else {
            bail!("simultaneous pairing has no entry for {}", direction);
        };
        ensure!(
            partner != direction,
            "{} cannot be paired with itself",
            direction
        );
    }
    let mut seen = HashSet::new();
    let mut current = Direction::Right;
    for _ in 0..Direction::ALL.len() {
        ensure!(
            seen.insert(current),
            "simultaneous pairing is not a single cycle over all four directions"
        );
        current = pairing[&current];
    }
    ensure!(
        current == Direction::Right,
        "simultaneous pairing is not a single cycle over all four directions"
    );
    Ok(())
}

/// Standard four-way geometry with every lane's spawn point
fn standard_intersection(name: &str, x_offset: f32) -> IntersectionConfig {
    let lanes = |points: [(f32, f32); 3]| points.map(|(x, y)| Position::new(x, y));
    IntersectionConfig {
        name: name.to_string(),
        x_offset,
        stop_lines: DirectionTable {
            right: 181.0,
            down: 408.0,
            left: 380.0,
            up: 612.0,
        },
        default_stops: DirectionTable {
            right: 161.0,
            down: 398.0,
            left: 400.0,
            up: 622.0,
        },
        midpoints: DirectionTable {
            right: Position::new(310.0, 445.0),
            down: Position::new(300.0, 538.0),
            left: Position::new(290.0, 405.0),
            up: Position::new(300.0, 500.0),
        },
        spawn_points: DirectionTable {
            right: lanes([(0.0, 410.0), (0.0, 443.0), (0.0, 476.0)]),
            down: lanes([(350.0, 0.0), (317.0, 0.0), (286.0, 0.0)]),
            left: lanes([(1400.0, 582.0), (1400.0, 549.0), (1400.0, 516.0)]),
            up: lanes([(184.0, 1023.0), (215.0, 1023.0), (248.0, 1023.0)]),
        },
        allowed_spawn_directions: Direction::ALL.to_vec(),
        neighbors: BTreeMap::new(),
        entry_zones: BTreeMap::new(),
    }
}

/// Lane-0 pivot distance beyond the stop line, per inbound direction
pub fn left_turn_pivot(direction: Direction) -> f32 {
    match direction {
        Direction::Right => 10.0,
        Direction::Down => 25.0,
        Direction::Left | Direction::Up => 0.0,
    }
}

/// Per-tick (dx, dy) a turning vehicle follows while it rotates
pub fn turn_offset(direction: Direction, lane: Lane) -> (f32, f32) {
    match (direction, lane) {
        (Direction::Right, Lane::LeftTurn) => (2.4, -2.8),
        (Direction::Right, _) => (2.0, 1.8),
        (Direction::Down, Lane::LeftTurn) => (1.2, 1.8),
        (Direction::Down, _) => (-2.5, 2.0),
        (Direction::Left, Lane::LeftTurn) => (-1.0, 1.2),
        (Direction::Left, _) => (-1.8, -2.5),
        (Direction::Up, Lane::LeftTurn) => (-2.0, -1.2),
        (Direction::Up, _) => (1.0, -1.0),
    }
}
