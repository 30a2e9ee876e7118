//! Core types for the intersection simulation
//!
//! Identifiers, directions, lanes, vehicle classes and the small geometry
//! helpers every other module builds on.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimId(pub usize);

/// A wrapper type for intersection IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntersectionId(pub SimId);

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub SimId);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0 .0)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0 .0)
    }
}

/// Screen axis a heading moves along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Travel heading of inbound traffic at an intersection.
///
/// Coordinates follow screen convention: `x` grows to the right and `y`
/// grows downward. A vehicle in the `Right` queue travels towards +x, i.e.
/// it arrives from the west side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
}

impl Direction {
    /// All directions in signal index order
    pub const ALL: [Direction; 4] = [
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::Up,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::Right => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Up => 3,
        }
    }

    /// Compass side the traffic comes from
    pub fn label(self) -> &'static str {
        match self {
            Direction::Right => "West",
            Direction::Down => "North",
            Direction::Left => "East",
            Direction::Up => "South",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Up => "up",
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Direction::Right | Direction::Left => Axis::X,
            Direction::Down | Direction::Up => Axis::Y,
        }
    }

    /// +1.0 when travel increases the axis coordinate, -1.0 otherwise
    pub fn sign(self) -> f32 {
        match self {
            Direction::Right | Direction::Down => 1.0,
            Direction::Left | Direction::Up => -1.0,
        }
    }

    /// Heading after a left turn
    pub fn left_of(self) -> Direction {
        match self {
            Direction::Right => Direction::Up,
            Direction::Down => Direction::Right,
            Direction::Left => Direction::Down,
            Direction::Up => Direction::Left,
        }
    }

    /// Heading after a right turn
    pub fn right_of(self) -> Direction {
        match self {
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
            Direction::Up => Direction::Right,
        }
    }

    /// Heading a vehicle leaves the intersection on for the given lane
    pub fn exit_heading(self, lane: Lane) -> Direction {
        match lane {
            Lane::LeftTurn => self.left_of(),
            Lane::Straight => self,
            Lane::RightTurn => self.right_of(),
        }
    }

    /// Coordinate of `position` along this heading's axis
    pub fn axis_coord(self, position: Position) -> f32 {
        match self.axis() {
            Axis::X => position.x,
            Axis::Y => position.y,
        }
    }

    /// Progress of a raw axis coordinate; larger is further along the heading
    pub fn project(self, coord: f32) -> f32 {
        self.sign() * coord
    }

    /// Progress of the leading edge of a footprint whose top-left is `position`
    pub fn front_progress(self, position: Position, length: f32) -> f32 {
        let coord = self.axis_coord(position);
        if self.sign() > 0.0 {
            coord + length
        } else {
            -coord
        }
    }

    /// Progress of the trailing edge of a footprint whose top-left is `position`
    pub fn rear_progress(self, position: Position, length: f32) -> f32 {
        self.front_progress(position, length) - length
    }

    /// Axis coordinate of the top-left corner that puts the leading edge at `front`
    pub fn coord_for_front(self, front: f32, length: f32) -> f32 {
        if self.sign() > 0.0 {
            front - length
        } else {
            -front
        }
    }

    /// Same position with its axis coordinate replaced
    pub fn with_axis_coord(self, position: Position, coord: f32) -> Position {
        match self.axis() {
            Axis::X => Position::new(coord, position.y),
            Axis::Y => Position::new(position.x, coord),
        }
    }

    /// Move `position` forward along this heading by `distance`
    pub fn advance(self, position: &mut Position, distance: f32) {
        match self.axis() {
            Axis::X => position.x += self.sign() * distance,
            Axis::Y => position.y += self.sign() * distance,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    /// Accepts heading names (`up`), origin labels (`south`) and their
    /// one-letter compass forms (`s`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "right" | "west" | "w" => Ok(Direction::Right),
            "down" | "north" | "n" => Ok(Direction::Down),
            "left" | "east" | "e" => Ok(Direction::Left),
            "up" | "south" | "s" => Ok(Direction::Up),
            other => bail!(
                "unrecognized direction '{}' (expected one of right, down, left, up)",
                other
            ),
        }
    }
}

/// One of the three parallel sub-queues of a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    LeftTurn,
    Straight,
    RightTurn,
}

impl Lane {
    pub const ALL: [Lane; 3] = [Lane::LeftTurn, Lane::Straight, Lane::RightTurn];

    pub fn index(self) -> usize {
        match self {
            Lane::LeftTurn => 0,
            Lane::Straight => 1,
            Lane::RightTurn => 2,
        }
    }

    pub fn is_turning(self) -> bool {
        self != Lane::Straight
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Bus,
    Truck,
    Bike,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Bus,
        VehicleClass::Truck,
        VehicleClass::Bike,
    ];

    /// Distance units travelled per tick
    pub fn default_speed(self) -> f32 {
        match self {
            VehicleClass::Car => 2.5,
            VehicleClass::Bus => 2.0,
            VehicleClass::Truck => 2.0,
            VehicleClass::Bike => 2.75,
        }
    }

    pub fn default_footprint(self) -> Footprint {
        match self {
            VehicleClass::Car => Footprint::new(40.0, 20.0),
            VehicleClass::Bus => Footprint::new(70.0, 25.0),
            VehicleClass::Truck => Footprint::new(60.0, 25.0),
            VehicleClass::Bike => Footprint::new(25.0, 12.0),
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VehicleClass::Car => "car",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
            VehicleClass::Bike => "bike",
        };
        f.write_str(name)
    }
}

/// Size of a vehicle; `length` is measured along its heading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub length: f32,
    pub width: f32,
}

impl Footprint {
    pub const fn new(length: f32, width: f32) -> Self {
        Self { length, width }
    }

    pub fn is_valid(&self) -> bool {
        self.length.is_finite() && self.width.is_finite() && self.length > 0.0 && self.width > 0.0
    }
}

/// A 2D position in the simulation (top-left of a footprint for vehicles)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle; contains its left/top edges but not right/bottom
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.x
            && point.x < self.x + self.w
            && point.y >= self.y
            && point.y < self.y + self.h
    }

    pub fn is_valid(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Footprint used when a class has no usable size configured
pub const DEFAULT_FOOTPRINT: Footprint = Footprint::new(30.0, 15.0);

/// Buffer kept behind a stopped leader
pub const STOPPING_GAP: f32 = 25.0;

/// Buffer kept behind a moving leader
pub const MOVING_GAP: f32 = 25.0;

/// Degrees a turning vehicle rotates per tick
pub const ROTATION_STEP: f32 = 3.0;
