//! Vehicle movement logic for the intersection simulation
//!
//! A vehicle approaches its stop line, waits for green, crosses, optionally
//! turns, and leaves along its exit heading. One movement routine handles
//! every direction: the heading supplies axis and sign, a small table
//! supplies the turning curve.

use anyhow::{ensure, Result};

use super::config::ClassProfile;
use super::types::{
    Axis, Direction, Footprint, IntersectionId, Lane, Position, Rect, VehicleClass, VehicleId,
};

/// Result of a vehicle update indicating what the world must record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    Continue, // Still moving or waiting
    Crossed,  // Leading edge passed the stop line this tick
    Turned,   // Completed its turn this tick
    Departed, // Left the world bounds after crossing
}

/// Position and size of another vehicle, as seen by the one updating
#[derive(Debug, Clone, Copy)]
pub struct OtherVehicle {
    pub position: Position,
    pub length: f32,
    pub turned: bool,
}

/// Everything a vehicle reads about its surroundings for one tick
#[derive(Debug, Clone, Copy)]
pub struct VehicleContext {
    /// Signal for this vehicle's direction and lane
    pub green: bool,
    /// Stop line coordinate on the vehicle's axis
    pub stop_line: f32,
    /// Progress at which a turning vehicle starts to rotate
    pub pivot: f32,
    /// Per-tick translation while rotating
    pub turn_offset: (f32, f32),
    /// Vehicle directly ahead in the same lane queue
    pub leader: Option<OtherVehicle>,
    /// Previous entry of the turned / not-turned list this vehicle follows
    pub predecessor: Option<OtherVehicle>,
    pub moving_gap: f32,
    pub rotation_step: f32,
    pub bounds: Rect,
}

/// A vehicle in the simulation
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub class: VehicleClass,
    pub speed: f32,
    pub footprint: Footprint,
    /// Top-left corner of the footprint
    pub position: Position,
    /// Intersection whose queue currently holds the vehicle
    pub intersection: IntersectionId,
    pub direction: Direction,
    pub lane: Lane,
    pub will_turn: bool,
    pub crossed: bool,
    pub turned: bool,
    /// Degrees rotated so far
    pub rotation: f32,
    pub queue_index: usize,
    /// Axis coordinate the leading edge may not pass without green
    pub stop: f32,
    pub handed_off: bool,
}

impl Vehicle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VehicleId,
        profile: &ClassProfile,
        intersection: IntersectionId,
        direction: Direction,
        lane: Lane,
        position: Position,
        queue_index: usize,
        stop: f32,
    ) -> Self {
        Self {
            id,
            class: profile.class,
            speed: profile.speed,
            footprint: profile.footprint,
            position,
            intersection,
            direction,
            lane,
            will_turn: lane.is_turning(),
            crossed: false,
            turned: false,
            rotation: 0.0,
            queue_index,
            stop,
            handed_off: false,
        }
    }

    pub fn length(&self) -> f32 {
        self.footprint.length
    }

    /// Heading the vehicle currently travels along
    pub fn heading(&self) -> Direction {
        if self.turned {
            self.direction.exit_heading(self.lane)
        } else {
            self.direction
        }
    }

    /// Leading-edge progress along the inbound direction
    pub fn front(&self) -> f32 {
        self.direction
            .front_progress(self.position, self.footprint.length)
    }

    /// Trailing-edge progress along the inbound direction
    pub fn rear(&self) -> f32 {
        self.direction
            .rear_progress(self.position, self.footprint.length)
    }

    /// Rotation at which the turn is complete
    pub fn rotation_target(&self) -> f32 {
        if self.handed_off {
            180.0
        } else {
            90.0
        }
    }

    /// Area covered by the vehicle, oriented along its heading
    pub fn bounding_rect(&self) -> Rect {
        let Footprint { length, width } = self.footprint;
        match self.heading().axis() {
            Axis::X => Rect::new(self.position.x, self.position.y, length, width),
            Axis::Y => Rect::new(self.position.x, self.position.y, width, length),
        }
    }

    pub fn as_other(&self) -> OtherVehicle {
        OtherVehicle {
            position: self.position,
            length: self.footprint.length,
            turned: self.turned,
        }
    }

    /// Move into a neighboring intersection's queue.
    ///
    /// The vehicle keeps its lane and rotation; it becomes inbound traffic
    /// travelling along `heading` and has to cross the new stop line again.
    pub fn hand_off(
        &mut self,
        intersection: IntersectionId,
        heading: Direction,
        queue_index: usize,
        stop: f32,
    ) {
        self.intersection = intersection;
        self.direction = heading;
        self.will_turn = self.lane.is_turning();
        self.crossed = false;
        self.turned = false;
        self.queue_index = queue_index;
        self.stop = stop;
        self.handed_off = true;
    }

    /// Advance the vehicle by one tick
    pub fn update(&mut self, ctx: &VehicleContext) -> Result<VehicleUpdateResult> {
        ensure!(
            self.position.x.is_finite() && self.position.y.is_finite(),
            "vehicle {} has a non-finite position {:?}",
            self.id,
            self.position
        );

        let mut result = VehicleUpdateResult::Continue;

        if !self.crossed && self.front() > self.direction.project(ctx.stop_line) {
            self.crossed = true;
            result = VehicleUpdateResult::Crossed;
        }

        if !self.crossed || (self.will_turn && !self.turned && self.front() < ctx.pivot) {
            self.approach(ctx);
        } else if self.will_turn && !self.turned {
            if self.rotate(ctx) {
                result = VehicleUpdateResult::Turned;
            }
        } else {
            self.follow(ctx);
        }

        if self.crossed && !self.bounding_rect().intersects(&ctx.bounds) {
            return Ok(VehicleUpdateResult::Departed);
        }

        Ok(result)
    }

    /// Move along the inbound direction, honouring the signal and the queue leader
    fn approach(&mut self, ctx: &VehicleContext) {
        let front = self.front();
        let may_pass =
            front <= self.direction.project(self.stop) || self.crossed || ctx.green;
        if !may_pass {
            return;
        }

        let clear = match ctx.leader {
            None => true,
            Some(leader) if leader.turned => true,
            Some(leader) => {
                let leader_rear = self.direction.rear_progress(leader.position, leader.length);
                leader_rear - front > ctx.moving_gap
            }
        };
        if clear {
            self.direction.advance(&mut self.position, self.speed);
        }
    }

    /// One step along the turning curve. Returns true when the turn completes.
    fn rotate(&mut self, ctx: &VehicleContext) -> bool {
        let (dx, dy) = ctx.turn_offset;
        self.rotation += ctx.rotation_step;
        self.position.x += dx;
        self.position.y += dy;
        if self.rotation >= self.rotation_target() {
            self.turned = true;
        }
        self.turned
    }

    /// Travel along the current heading behind the previous vehicle that left
    /// the same way
    fn follow(&mut self, ctx: &VehicleContext) {
        let heading = self.heading();
        let length = self.footprint.length;
        let front = heading.front_progress(self.position, length);
        let clear = match ctx.predecessor {
            None => true,
            Some(ahead) => {
                heading.rear_progress(ahead.position, ahead.length) - front > ctx.moving_gap
            }
        };
        if clear {
            heading.advance(&mut self.position, self.speed);
        }
    }
}
