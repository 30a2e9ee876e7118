//! Intersection geometry, lane queues and signal controller
//!
//! An intersection never goes away during a run; it owns the queues of its
//! four approaches and the controller that serves them.

use std::collections::BTreeMap;

use super::config::{left_turn_pivot, turn_offset, IntersectionConfig, SimConfig};
use super::lane_registry::{LaneRegistry, QueueCounts};
use super::signal::SignalController;
use super::types::{Axis, Direction, IntersectionId, Lane, Position, Rect};

/// Fixed coordinates of one approach, already shifted by the intersection offset
#[derive(Debug, Clone, Copy)]
pub struct Approach {
    pub stop_line: f32,
    pub default_stop: f32,
    pub midpoint: Position,
    pub spawn_points: [Position; 3],
}

/// Tail of a lane queue, as needed to place the vehicle behind it
#[derive(Debug, Clone, Copy)]
pub struct QueueTail {
    pub stop: f32,
    pub length: f32,
    pub crossed: bool,
}

/// An intersection in the simulation
#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: IntersectionId,
    pub name: String,
    pub x_offset: f32,
    approaches: [Approach; 4],
    pub allowed_spawn_directions: Vec<Direction>,
    /// Inbound heading -> zone that hands a vehicle over to this intersection
    pub entry_zones: BTreeMap<Direction, Rect>,
    pub lanes: LaneRegistry,
    pub controller: SignalController,
    stopping_gap: f32,
}

impl Intersection {
    pub fn from_config(
        id: IntersectionId,
        config: &IntersectionConfig,
        sim: &SimConfig,
        pairing: BTreeMap<Direction, Direction>,
    ) -> Self {
        let offset = config.x_offset;
        let shift = |p: Position| Position::new(p.x + offset, p.y);
        let approaches = Direction::ALL.map(|direction| {
            let along = |coord: f32| match direction.axis() {
                Axis::X => coord + offset,
                Axis::Y => coord,
            };
            Approach {
                stop_line: along(config.stop_lines.get(direction)),
                default_stop: along(config.default_stops.get(direction)),
                midpoint: shift(config.midpoints.get(direction)),
                spawn_points: config.spawn_points.get(direction).map(shift),
            }
        });
        let lanes = LaneRegistry::new(|direction, lane| {
            approaches[direction.index()].spawn_points[lane.index()]
        });
        let controller = SignalController::new(
            id,
            sim.controller_mode,
            sim.timing.clone(),
            sim.startup_delay_secs,
            pairing,
        );

        Self {
            id,
            name: config.name.clone(),
            x_offset: offset,
            approaches,
            allowed_spawn_directions: config.allowed_spawn_directions.clone(),
            entry_zones: config.entry_zones.clone(),
            lanes,
            controller,
            stopping_gap: sim.stopping_gap,
        }
    }

    pub fn approach(&self, direction: Direction) -> &Approach {
        &self.approaches[direction.index()]
    }

    /// Progress at which a vehicle in `direction`/`lane` starts turning.
    /// Straight vehicles never reach it.
    pub fn pivot(&self, direction: Direction, lane: Lane) -> f32 {
        let approach = self.approach(direction);
        match lane {
            Lane::LeftTurn => {
                direction.project(approach.stop_line) + left_turn_pivot(direction)
            }
            Lane::Straight => f32::INFINITY,
            Lane::RightTurn => direction.project(direction.axis_coord(approach.midpoint)),
        }
    }

    pub fn turn_offset(&self, direction: Direction, lane: Lane) -> (f32, f32) {
        turn_offset(direction, lane)
    }

    /// Stop coordinate for a vehicle joining behind `tail`.
    ///
    /// Behind a vehicle that is still waiting, the stop is that vehicle's stop
    /// pushed back by its length plus the stopping gap; otherwise the
    /// approach's default stop.
    pub fn initial_stop(&self, direction: Direction, tail: Option<QueueTail>) -> f32 {
        match tail {
            Some(tail) if !tail.crossed => {
                tail.stop - direction.sign() * (tail.length + self.stopping_gap)
            }
            _ => self.approach(direction).default_stop,
        }
    }

    /// Whether vehicles in `direction`/`lane` may pass the stop line.
    /// Right turns follow the primary green only.
    pub fn is_green(&self, direction: Direction, lane: Lane) -> bool {
        if lane == Lane::RightTurn {
            return self.controller.phase().is_some_and(|phase| {
                phase.primary == direction && phase.lanes[lane.index()].is_green()
            });
        }
        self.controller.is_green(direction, lane)
    }

    pub fn counts(&self) -> QueueCounts {
        self.lanes.counts()
    }

    /// Entry zone receiving traffic that travels along `heading`
    pub fn entry_zone(&self, heading: Direction) -> Option<&Rect> {
        self.entry_zones.get(&heading)
    }
}
