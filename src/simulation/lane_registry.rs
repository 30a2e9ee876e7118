//! Per-intersection lane queues and counters
//!
//! Every intersection keeps 4 directions x 3 lanes of [`LaneQueue`]. A queue
//! holds vehicle ids front-to-back; counters and the turned / not-turned lists
//! feed the signal controller and gap keeping after the stop line.

use serde::Serialize;

use super::types::{Direction, Lane, Position, VehicleId};

/// One lane of one approach
#[derive(Debug, Clone)]
pub struct LaneQueue {
    /// Vehicles in arrival order; index 0 is the front of the queue
    pub vehicles: Vec<VehicleId>,
    /// Spawned plus handed-in vehicles
    pub arrived: usize,
    /// Vehicles whose leading edge has passed the stop line
    pub crossed: usize,
    /// Crossed vehicles that completed their turn, in completion order
    pub turned: Vec<VehicleId>,
    /// Crossed vehicles that go straight, in crossing order
    pub not_turned: Vec<VehicleId>,
    /// Furthest progress the next spawned vehicle's leading edge may reach,
    /// `None` while the base spawn point is free
    pub spawn_cursor: Option<f32>,
    base_spawn: Position,
}

impl LaneQueue {
    pub fn new(base_spawn: Position) -> Self {
        Self {
            vehicles: Vec::new(),
            arrived: 0,
            crossed: 0,
            turned: Vec::new(),
            not_turned: Vec::new(),
            spawn_cursor: None,
            base_spawn,
        }
    }

    /// Vehicles that arrived but have not crossed yet
    pub fn remaining(&self) -> usize {
        debug_assert!(
            self.crossed <= self.arrived,
            "crossed ({}) exceeds arrived ({})",
            self.crossed,
            self.arrived
        );
        self.arrived.saturating_sub(self.crossed)
    }

    /// Append a vehicle and count its arrival. Returns its queue index.
    pub fn push(&mut self, id: VehicleId) -> usize {
        self.vehicles.push(id);
        self.arrived += 1;
        self.vehicles.len() - 1
    }

    /// Remove a vehicle from the queue, returning the index it held.
    /// Vehicles behind it shift forward by one.
    pub fn remove(&mut self, id: VehicleId) -> Option<usize> {
        let index = self.vehicles.iter().position(|&v| v == id)?;
        self.vehicles.remove(index);
        Some(index)
    }

    pub fn tail(&self) -> Option<VehicleId> {
        self.vehicles.last().copied()
    }

    /// Vehicle directly ahead of `index` in the queue
    pub fn leader_of(&self, index: usize) -> Option<VehicleId> {
        index
            .checked_sub(1)
            .and_then(|i| self.vehicles.get(i))
            .copied()
    }

    pub fn record_crossing(&mut self, id: VehicleId, turning: bool) {
        self.crossed += 1;
        if !turning {
            self.not_turned.push(id);
        }
    }

    pub fn record_turn(&mut self, id: VehicleId) {
        self.turned.push(id);
    }

    /// Entry before `id` in the turned list
    pub fn turned_predecessor(&self, id: VehicleId) -> Option<VehicleId> {
        predecessor(&self.turned, id)
    }

    /// Entry before `id` in the not-turned list
    pub fn not_turned_predecessor(&self, id: VehicleId) -> Option<VehicleId> {
        predecessor(&self.not_turned, id)
    }

    /// Drop every reference to `id` from the turned / not-turned lists
    pub fn purge(&mut self, id: VehicleId) {
        self.turned.retain(|&v| v != id);
        self.not_turned.retain(|&v| v != id);
    }

    /// Claim a spawn position for a vehicle of `length`.
    ///
    /// `tail_rear` is the trailing-edge progress of the current tail vehicle.
    /// Once the tail has cleared the base point by `gap`, the cursor is
    /// reclaimed and spawning starts from the base point again; otherwise the
    /// new vehicle is placed `gap` behind the previous spawn.
    pub fn claim_spawn_point(
        &mut self,
        direction: Direction,
        length: f32,
        gap: f32,
        tail_rear: Option<f32>,
    ) -> Position {
        let base_front = direction.front_progress(self.base_spawn, length);
        let base_clear = match tail_rear {
            Some(rear) => base_front + gap <= rear,
            None => true,
        };
        if base_clear {
            self.spawn_cursor = None;
        }

        let mut front = match self.spawn_cursor {
            Some(limit) => base_front.min(limit),
            None => base_front,
        };
        if let Some(rear) = tail_rear {
            front = front.min(rear - gap);
        }
        self.spawn_cursor = Some(front - length - gap);

        let coord = direction.coord_for_front(front, length);
        direction.with_axis_coord(self.base_spawn, coord)
    }
}

fn predecessor(list: &[VehicleId], id: VehicleId) -> Option<VehicleId> {
    let index = list.iter().position(|&v| v == id)?;
    index.checked_sub(1).map(|i| list[i])
}

/// Remaining vehicles per direction and lane, in direction order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts(pub [[usize; 3]; 4]);

impl QueueCounts {
    pub fn lane(&self, direction: Direction, lane: Lane) -> usize {
        self.0[direction.index()][lane.index()]
    }

    pub fn direction(&self, direction: Direction) -> usize {
        self.0[direction.index()].iter().sum()
    }

    pub fn set(&mut self, direction: Direction, lane: Lane, count: usize) {
        self.0[direction.index()][lane.index()] = count;
    }
}

/// All lane queues of one intersection
#[derive(Debug, Clone)]
pub struct LaneRegistry {
    queues: [[LaneQueue; 3]; 4],
}

impl LaneRegistry {
    /// Build empty queues; `spawn_point` gives each lane's base spawn point
    pub fn new(spawn_point: impl Fn(Direction, Lane) -> Position) -> Self {
        let queues = std::array::from_fn(|d| {
            std::array::from_fn(|l| {
                let direction = Direction::ALL[d];
                let lane = Lane::ALL[l];
                LaneQueue::new(spawn_point(direction, lane))
            })
        });
        Self { queues }
    }

    pub fn queue(&self, direction: Direction, lane: Lane) -> &LaneQueue {
        &self.queues[direction.index()][lane.index()]
    }

    pub fn queue_mut(&mut self, direction: Direction, lane: Lane) -> &mut LaneQueue {
        &mut self.queues[direction.index()][lane.index()]
    }

    pub fn remaining(&self, direction: Direction, lane: Lane) -> usize {
        self.queue(direction, lane).remaining()
    }

    pub fn remaining_for(&self, direction: Direction) -> usize {
        Lane::ALL
            .iter()
            .map(|&lane| self.remaining(direction, lane))
            .sum()
    }

    pub fn arrived_for(&self, direction: Direction) -> usize {
        Lane::ALL
            .iter()
            .map(|&lane| self.queue(direction, lane).arrived)
            .sum()
    }

    pub fn crossed_for(&self, direction: Direction) -> usize {
        Lane::ALL
            .iter()
            .map(|&lane| self.queue(direction, lane).crossed)
            .sum()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for direction in Direction::ALL {
            for lane in Lane::ALL {
                counts.set(direction, lane, self.remaining(direction, lane));
            }
        }
        counts
    }

    /// Remove `id` from every turned / not-turned list
    pub fn purge(&mut self, id: VehicleId) {
        for queue in self.queues.iter_mut().flatten() {
            queue.purge(id);
        }
    }

    /// Every queued vehicle in update order: direction, lane, front to back
    pub fn ordered_vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.queues
            .iter()
            .flatten()
            .flat_map(|queue| queue.vehicles.iter().copied())
    }
}
