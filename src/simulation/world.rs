//! Main simulation world that ties everything together
//!
//! `SimWorld` owns every intersection and vehicle. A tick is one `&mut`
//! step: spawn, move vehicles in a fixed order, hand vehicles over between
//! intersections, and on second boundaries advance the signal controllers.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

use super::clock::SimClock;
use super::config::{ClassProfile, SimConfig, TopologyConfig};
use super::coordinator::Coordinator;
use super::intersection::{Intersection, QueueTail};
use super::snapshot::{
    throughput_pct, DirectionSnapshot, IntersectionSnapshot, SimulationSnapshot, VehicleSnapshot,
};
use super::spawner::Spawner;
use super::types::{Direction, IntersectionId, Lane, Rect, SimId, VehicleClass, VehicleId};
use super::vehicle::{Vehicle, VehicleContext, VehicleUpdateResult};

/// Counters that are not kept by the lane queues
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    /// Vehicles that left the world bounds
    pub departed: usize,
    /// Transfers between intersections
    pub handoffs: usize,
    /// Vehicles removed because their update failed
    pub dropped: usize,
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,

    /// All intersections, ordered by id
    pub intersections: BTreeMap<IntersectionId, Intersection>,

    /// All vehicles
    pub vehicles: HashMap<VehicleId, Vehicle>,

    /// Neighbor links between intersections
    pub coordinator: Coordinator,

    /// Crossed vehicles outside this area are removed
    pub bounds: Rect,

    pub clock: SimClock,

    pub stats: RunStats,

    spawner: Spawner,

    /// Enabled vehicle classes with resolved speed and footprint
    profiles: Vec<ClassProfile>,

    /// Next ID to assign
    next_id: usize,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    fn new_internal(config: SimConfig, topology: &TopologyConfig, rng: Option<StdRng>) -> Self {
        let clock = SimClock::new(config.tick_rate);
        let spawner = Spawner::new(&config.spawn, clock.ticks_for(config.spawn.interval_secs));
        let profiles = config.class_profiles();

        let mut world = Self {
            intersections: BTreeMap::new(),
            vehicles: HashMap::new(),
            coordinator: Coordinator::new(),
            bounds: topology.bounds,
            clock,
            stats: RunStats::default(),
            spawner,
            profiles,
            next_id: 0,
            rng,
            config,
        };

        let mut ids_by_name = HashMap::new();
        for intersection_config in &topology.intersections {
            let id = IntersectionId(world.next_sim_id());
            let intersection = Intersection::from_config(
                id,
                intersection_config,
                &world.config,
                topology.simultaneous.clone(),
            );
            world.intersections.insert(id, intersection);
            world.coordinator.add_intersection(id);
            ids_by_name.insert(intersection_config.name.as_str(), id);
        }

        for intersection_config in &topology.intersections {
            let Some(&from) = ids_by_name.get(intersection_config.name.as_str()) else {
                continue;
            };
            for (&heading, neighbor) in &intersection_config.neighbors {
                let linked = ids_by_name
                    .get(neighbor.as_str())
                    .context("unknown neighbor")
                    .and_then(|&to| world.coordinator.link(from, heading, to));
                if let Err(e) = linked {
                    warn!(
                        "Skipping link {} -> {} ({}): {:#}",
                        intersection_config.name, neighbor, heading, e
                    );
                }
            }
        }

        world
    }

    /// Default two-intersection world with thread-local randomness
    pub fn new() -> Self {
        Self::new_internal(SimConfig::default(), &TopologyConfig::default(), None)
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(seed: u64) -> Self {
        Self::new_internal(
            SimConfig::default(),
            &TopologyConfig::default(),
            Some(StdRng::seed_from_u64(seed)),
        )
    }

    /// Build a world from explicit configuration, validating both documents
    pub fn from_config(
        config: SimConfig,
        topology: &TopologyConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate().context("Invalid simulation config")?;
        topology.validate().context("Invalid topology")?;
        Ok(Self::new_internal(
            config,
            topology,
            seed.map(StdRng::seed_from_u64),
        ))
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn intersection_id(&self, name: &str) -> Option<IntersectionId> {
        self.intersections
            .values()
            .find(|i| i.name == name)
            .map(|i| i.id)
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.get(&id)
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn total_spawned(&self) -> usize {
        self.spawner.total_spawned
    }

    /// Crossings summed over every intersection; a handed-off vehicle counts once per crossing
    pub fn total_crossed(&self) -> usize {
        self.intersections
            .values()
            .map(|i| Direction::ALL.iter().map(|&d| i.lanes.crossed_for(d)).sum::<usize>())
            .sum()
    }

    pub fn total_arrived(&self) -> usize {
        self.intersections
            .values()
            .map(|i| Direction::ALL.iter().map(|&d| i.lanes.arrived_for(d)).sum::<usize>())
            .sum()
    }

    pub fn throughput_pct(&self) -> f32 {
        throughput_pct(self.total_crossed(), self.total_arrived())
    }

    /// True once the configured simulation time has elapsed
    pub fn is_finished(&self) -> bool {
        self.clock.seconds() >= u64::from(self.config.simulation_time_secs)
    }

    /// Advance the simulation by one tick
    pub fn tick(&mut self) {
        let second_elapsed = self.clock.advance();

        if self.spawner.on_tick() && self.config.spawn.enabled {
            if let Err(e) = self.spawn_random_vehicle() {
                warn!("Spawn skipped: {:#}", e);
            }
        }

        self.update_vehicles();
        self.process_handoffs();

        if second_elapsed {
            self.update_signals();
        }
    }

    /// Run `secs` simulated seconds
    pub fn run_seconds(&mut self, secs: f32) {
        for _ in 0..self.clock.ticks_for(secs) {
            self.tick();
        }
    }

    /// Spawn a vehicle chosen by the spawner
    pub fn spawn_random_vehicle(&mut self) -> Result<VehicleId> {
        let plan = match &mut self.rng {
            Some(rng) => self.spawner.plan(rng, &self.intersections, &self.profiles),
            None => self
                .spawner
                .plan(&mut rand::rng(), &self.intersections, &self.profiles),
        }
        .context("No intersection, direction or vehicle class to spawn")?;

        self.spawn_vehicle(plan.intersection, plan.direction, plan.lane, plan.profile.class)
    }

    /// Spawn a vehicle at the back of a specific lane
    pub fn spawn_vehicle(
        &mut self,
        intersection_id: IntersectionId,
        direction: Direction,
        lane: Lane,
        class: VehicleClass,
    ) -> Result<VehicleId> {
        let profile = *self
            .profiles
            .iter()
            .find(|p| p.class == class)
            .with_context(|| format!("Vehicle class {} is not enabled", class))?;

        let intersection = self
            .intersections
            .get(&intersection_id)
            .context("Intersection not found")?;
        let tail = intersection
            .lanes
            .queue(direction, lane)
            .tail()
            .and_then(|tail_id| self.vehicles.get(&tail_id));
        let tail_rear = tail.map(|v| direction.rear_progress(v.position, v.length()));
        let stop = intersection.initial_stop(direction, tail.map(queue_tail));

        let id = VehicleId(self.next_sim_id());
        let gap = self.config.stopping_gap;
        let queue = self
            .intersections
            .get_mut(&intersection_id)
            .context("Intersection not found")?
            .lanes
            .queue_mut(direction, lane);
        let position = queue.claim_spawn_point(direction, profile.footprint.length, gap, tail_rear);
        let index = queue.push(id);

        let vehicle = Vehicle::new(
            id,
            &profile,
            intersection_id,
            direction,
            lane,
            position,
            index,
            stop,
        );
        self.vehicles.insert(id, vehicle);
        self.spawner.total_spawned += 1;
        Ok(id)
    }

    /// Queue `direction` as the next green at `intersection_id`.
    ///
    /// Accepts heading names and compass labels; anything else is rejected
    /// without touching the controller.
    pub fn set_override(
        &mut self,
        intersection_id: IntersectionId,
        direction: &str,
    ) -> Result<Direction> {
        let direction: Direction = direction.parse()?;
        let intersection = self
            .intersections
            .get_mut(&intersection_id)
            .ok_or_else(|| anyhow!("Unknown intersection {}", intersection_id))?;
        intersection.controller.request_green(direction);
        Ok(direction)
    }

    /// Every queued vehicle in update order: intersection, direction, lane, queue position
    fn ordered_vehicle_ids(&self) -> Vec<VehicleId> {
        self.intersections
            .values()
            .flat_map(|i| i.lanes.ordered_vehicles())
            .collect()
    }

    /// Update all vehicles in the simulation
    fn update_vehicles(&mut self) {
        for vehicle_id in self.ordered_vehicle_ids() {
            let ctx = match self.vehicle_context(vehicle_id) {
                Ok(ctx) => ctx,
                Err(e) => {
                    if self.vehicles.contains_key(&vehicle_id) {
                        warn!("Dropping vehicle {}: {:#}", vehicle_id, e);
                        self.despawn_vehicle(vehicle_id);
                        self.stats.dropped += 1;
                    }
                    continue;
                }
            };

            // Take the vehicle out, update it, then put it back
            let Some(mut vehicle) = self.vehicles.remove(&vehicle_id) else {
                continue;
            };
            let result = vehicle.update(&ctx);
            let (intersection_id, direction, lane) =
                (vehicle.intersection, vehicle.direction, vehicle.lane);
            let turning = vehicle.will_turn;
            self.vehicles.insert(vehicle_id, vehicle);

            match result {
                Ok(VehicleUpdateResult::Continue) => {}
                Ok(VehicleUpdateResult::Crossed) => {
                    if let Some(intersection) = self.intersections.get_mut(&intersection_id) {
                        intersection
                            .lanes
                            .queue_mut(direction, lane)
                            .record_crossing(vehicle_id, turning);
                    }
                }
                Ok(VehicleUpdateResult::Turned) => {
                    if let Some(intersection) = self.intersections.get_mut(&intersection_id) {
                        intersection
                            .lanes
                            .queue_mut(direction, lane)
                            .record_turn(vehicle_id);
                    }
                }
                Ok(VehicleUpdateResult::Departed) => {
                    self.despawn_vehicle(vehicle_id);
                    self.stats.departed += 1;
                }
                Err(e) => {
                    warn!("Dropping vehicle {}: {:#}", vehicle_id, e);
                    self.despawn_vehicle(vehicle_id);
                    self.stats.dropped += 1;
                }
            }
        }
    }

    /// Gather what `vehicle_id` needs to know for this tick
    fn vehicle_context(&self, vehicle_id: VehicleId) -> Result<VehicleContext> {
        let vehicle = self.vehicles.get(&vehicle_id).context("Vehicle not found")?;
        let intersection = self
            .intersections
            .get(&vehicle.intersection)
            .context("Vehicle's intersection not found")?;
        let (direction, lane) = (vehicle.direction, vehicle.lane);
        let queue = intersection.lanes.queue(direction, lane);
        debug_assert_eq!(
            queue.vehicles.get(vehicle.queue_index),
            Some(&vehicle_id),
            "queue index out of sync"
        );

        let leader = match queue.leader_of(vehicle.queue_index) {
            Some(leader_id) => Some(
                self.vehicles
                    .get(&leader_id)
                    .with_context(|| format!("Leader {} not found", leader_id))?
                    .as_other(),
            ),
            None => None,
        };

        let predecessor_id = if vehicle.turned {
            queue.turned_predecessor(vehicle_id)
        } else if vehicle.crossed && !vehicle.will_turn {
            queue.not_turned_predecessor(vehicle_id)
        } else {
            None
        };
        let predecessor = predecessor_id
            .and_then(|id| self.vehicles.get(&id))
            .map(Vehicle::as_other);

        Ok(VehicleContext {
            green: intersection.is_green(direction, lane),
            stop_line: intersection.approach(direction).stop_line,
            pivot: intersection.pivot(direction, lane),
            turn_offset: intersection.turn_offset(direction, lane),
            leader,
            predecessor,
            moving_gap: self.config.moving_gap,
            rotation_step: self.config.rotation_step,
            bounds: self.bounds,
        })
    }

    /// Transfer vehicles that entered a neighbor's entry zone
    fn process_handoffs(&mut self) {
        for vehicle_id in self.ordered_vehicle_ids() {
            let Some(vehicle) = self.vehicles.get(&vehicle_id) else {
                continue;
            };
            if vehicle.handed_off || !vehicle.crossed || (vehicle.will_turn && !vehicle.turned) {
                continue;
            }
            let heading = vehicle.heading();
            let Some(target) = self.coordinator.handoff_target(
                &self.intersections,
                vehicle.intersection,
                heading,
                vehicle.position,
            ) else {
                continue;
            };

            if let Err(e) = self.hand_off(vehicle_id, target, heading) {
                warn!("Dropping vehicle {} after failed handoff: {:#}", vehicle_id, e);
                self.despawn_vehicle(vehicle_id);
                self.stats.dropped += 1;
            }
        }
    }

    /// Move a vehicle into `target`'s queue for `heading`, keeping its lane
    fn hand_off(
        &mut self,
        vehicle_id: VehicleId,
        target: IntersectionId,
        heading: Direction,
    ) -> Result<()> {
        let (from, lane) = {
            let vehicle = self.vehicles.get(&vehicle_id).context("Vehicle not found")?;
            (vehicle.intersection, vehicle.lane)
        };
        let intersection = self
            .intersections
            .get(&target)
            .context("Handoff target not found")?;
        let tail = intersection
            .lanes
            .queue(heading, lane)
            .tail()
            .and_then(|tail_id| self.vehicles.get(&tail_id))
            .map(queue_tail);
        let stop = intersection.initial_stop(heading, tail);

        self.remove_from_queue(vehicle_id)?;
        let index = self
            .intersections
            .get_mut(&target)
            .context("Handoff target not found")?
            .lanes
            .queue_mut(heading, lane)
            .push(vehicle_id);

        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .context("Vehicle not found")?;
        vehicle.hand_off(target, heading, index, stop);
        self.stats.handoffs += 1;

        debug!(
            "Vehicle {} handed off {} -> {} heading {} lane {}",
            vehicle_id, from, target, heading, lane
        );
        Ok(())
    }

    /// Take a vehicle out of its lane queue and re-index the vehicles behind it
    fn remove_from_queue(&mut self, vehicle_id: VehicleId) -> Result<()> {
        let vehicle = self.vehicles.get(&vehicle_id).context("Vehicle not found")?;
        let (intersection_id, direction, lane) =
            (vehicle.intersection, vehicle.direction, vehicle.lane);
        let queue = self
            .intersections
            .get_mut(&intersection_id)
            .context("Vehicle's intersection not found")?
            .lanes
            .queue_mut(direction, lane);
        let removed_at = queue
            .remove(vehicle_id)
            .with_context(|| format!("Vehicle {} missing from its queue", vehicle_id))?;

        for (index, id) in queue.vehicles.iter().enumerate().skip(removed_at) {
            if let Some(behind) = self.vehicles.get_mut(id) {
                behind.queue_index = index;
            }
        }
        Ok(())
    }

    /// Despawn a vehicle and clean up references
    fn despawn_vehicle(&mut self, vehicle_id: VehicleId) {
        if let Err(e) = self.remove_from_queue(vehicle_id) {
            debug!("Despawning {}: {:#}", vehicle_id, e);
        }
        for intersection in self.intersections.values_mut() {
            intersection.lanes.purge(vehicle_id);
        }
        self.vehicles.remove(&vehicle_id);
    }

    /// Advance every signal controller by one second
    fn update_signals(&mut self) {
        let ids: Vec<IntersectionId> = self.intersections.keys().copied().collect();
        for id in ids {
            let congestion = self.coordinator.congestion_for(&self.intersections, id);
            let Some(intersection) = self.intersections.get_mut(&id) else {
                continue;
            };
            let counts = intersection.counts();
            let expired = intersection.controller.on_second(&counts, &congestion);
            for (direction, lane) in expired {
                self.release_queue(id, direction, lane);
            }
        }
    }

    /// Reset the stop of every waiting vehicle in a lane to the default stop
    fn release_queue(&mut self, id: IntersectionId, direction: Direction, lane: Lane) {
        let Some(intersection) = self.intersections.get(&id) else {
            return;
        };
        let default_stop = intersection.approach(direction).default_stop;
        for vehicle_id in &intersection.lanes.queue(direction, lane).vehicles {
            if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
                if !vehicle.crossed {
                    vehicle.stop = default_stop;
                }
            }
        }
    }

    /// Smallest gap between consecutive waiting vehicles of any lane.
    /// Negative means two footprints overlap.
    pub fn min_queue_gap(&self) -> Option<OrderedFloat<f32>> {
        let mut gaps = Vec::new();
        for intersection in self.intersections.values() {
            for direction in Direction::ALL {
                for lane in Lane::ALL {
                    let queue = intersection.lanes.queue(direction, lane);
                    for pair in queue.vehicles.windows(2) {
                        let (Some(ahead), Some(behind)) =
                            (self.vehicles.get(&pair[0]), self.vehicles.get(&pair[1]))
                        else {
                            continue;
                        };
                        if ahead.crossed || behind.crossed {
                            continue;
                        }
                        gaps.push(OrderedFloat(ahead.rear() - behind.front()));
                    }
                }
            }
        }
        gaps.into_iter().min()
    }

    /// Structured view of the current state
    pub fn snapshot(&self) -> SimulationSnapshot {
        let intersections = self
            .intersections
            .values()
            .map(|intersection| {
                let display = intersection.controller.display();
                let counts = intersection.counts();
                let congestion = self
                    .coordinator
                    .congestion_for(&self.intersections, intersection.id);
                let directions = Direction::ALL
                    .iter()
                    .map(|&direction| DirectionSnapshot {
                        direction,
                        label: direction.label(),
                        signal: display[direction.index()],
                        spawned: intersection.lanes.arrived_for(direction),
                        crossed: intersection.lanes.crossed_for(direction),
                        remaining: intersection.lanes.remaining_for(direction),
                        wait_cycles: intersection.controller.wait_cycles(direction),
                    })
                    .collect::<Vec<_>>();
                let arrived: usize = directions.iter().map(|d| d.spawned).sum();
                let crossed: usize = directions.iter().map(|d| d.crossed).sum();
                IntersectionSnapshot {
                    id: intersection.id,
                    name: intersection.name.clone(),
                    mode: intersection.controller.mode(),
                    directions,
                    suggestion: intersection.controller.suggestion(&counts, &congestion),
                    pending_override: intersection.controller.pending_override(),
                    throughput_pct: throughput_pct(crossed, arrived),
                }
            })
            .collect();

        let mut vehicles: Vec<VehicleSnapshot> = self
            .vehicles
            .values()
            .map(|v| VehicleSnapshot {
                id: v.id,
                intersection: v.intersection,
                direction: v.direction,
                lane: v.lane,
                class: v.class,
                x: v.position.x,
                y: v.position.y,
                rotation: v.rotation,
                crossed: v.crossed,
                turned: v.turned,
            })
            .collect();
        vehicles.sort_by_key(|v| v.id);

        SimulationSnapshot {
            tick: self.clock.tick(),
            elapsed_secs: self.clock.elapsed_secs(),
            intersections,
            vehicles,
            total_spawned: self.total_spawned(),
            total_crossed: self.total_crossed(),
            throughput_pct: self.throughput_pct(),
        }
    }

    /// Create the default two-intersection world
    pub fn create_test_world() -> Self {
        Self::new()
    }

    /// Create the default two-intersection world with a seeded RNG
    pub fn create_test_world_with_seed(seed: u64) -> Self {
        Self::new_with_seed(seed)
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Intersection Simulation Summary ===");
        println!(
            "Time: {:.2}s (tick {})",
            self.clock.elapsed_secs(),
            self.clock.tick()
        );
        println!(
            "Intersections: {}, Links: {}",
            self.intersections.len(),
            self.coordinator.link_count()
        );
        println!(
            "Vehicles: {} active, {} spawned, {} departed, {} handoffs",
            self.vehicles.len(),
            self.total_spawned(),
            self.stats.departed,
            self.stats.handoffs
        );
        if let Some(gap) = self.min_queue_gap() {
            println!("Tightest queue gap: {:.1}", gap.into_inner());
        }

        for intersection in self.intersections.values() {
            println!("--- {} ({}) ---", intersection.name, intersection.id);
            let display = intersection.controller.display();
            for direction in Direction::ALL {
                let state = display[direction.index()];
                println!(
                    "  {:<5} {:<6} {:?} {:>3}s  arrived={} crossed={} waiting={}",
                    direction.name(),
                    direction.label(),
                    state.display,
                    state.countdown,
                    intersection.lanes.arrived_for(direction),
                    intersection.lanes.crossed_for(direction),
                    intersection.lanes.remaining_for(direction)
                );
            }
        }
    }

    /// Log the end-of-run statistics
    pub fn log_final_stats(&self) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.clock.elapsed_secs());
        for intersection in self.intersections.values() {
            for direction in Direction::ALL {
                info!(
                    "{} {} ({}): {} crossed",
                    intersection.name,
                    direction,
                    direction.label(),
                    intersection.lanes.crossed_for(direction)
                );
            }
        }
        info!("Total vehicles spawned: {}", self.total_spawned());
        info!("Total crossings: {}", self.total_crossed());
        info!("Handoffs: {}", self.stats.handoffs);
        info!("Departed vehicles: {}", self.stats.departed);
        info!("Active vehicles: {}", self.vehicles.len());
        info!("Total intersections: {}", self.intersections.len());
        info!("Throughput: {:.1}%", self.throughput_pct());
    }
}

fn queue_tail(vehicle: &Vehicle) -> QueueTail {
    QueueTail {
        stop: vehicle.stop,
        length: vehicle.length(),
        crossed: vehicle.crossed,
    }
}
