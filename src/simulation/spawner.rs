//! Vehicle injection
//!
//! Every spawn interval the spawner picks an intersection, an inbound
//! direction, a lane and a vehicle class. Placement in the lane is left to
//! the world, which owns the queues.

use rand::seq::IndexedRandom;
use rand::Rng;

use std::collections::BTreeMap;

use super::config::{ClassProfile, IntersectionSelection, LaneWeighting, SpawnConfig};
use super::intersection::Intersection;
use super::types::{Direction, IntersectionId, Lane};

/// Where and what to spawn next
#[derive(Debug, Clone, Copy)]
pub struct SpawnPlan {
    pub intersection: IntersectionId,
    pub direction: Direction,
    pub lane: Lane,
    pub profile: ClassProfile,
}

#[derive(Debug, Clone)]
pub struct Spawner {
    interval_ticks: u64,
    ticks_since_spawn: u64,
    selection: IntersectionSelection,
    weighting: LaneWeighting,
    round_robin_cursor: usize,
    pub total_spawned: usize,
}

impl Spawner {
    pub fn new(config: &SpawnConfig, interval_ticks: u64) -> Self {
        Self {
            interval_ticks: interval_ticks.max(1),
            ticks_since_spawn: 0,
            selection: config.intersection_selection,
            weighting: config.lane_weighting,
            round_robin_cursor: 0,
            total_spawned: 0,
        }
    }

    /// Count one tick. Returns true when a vehicle is due.
    pub fn on_tick(&mut self) -> bool {
        self.ticks_since_spawn += 1;
        if self.ticks_since_spawn >= self.interval_ticks {
            self.ticks_since_spawn = 0;
            true
        } else {
            false
        }
    }

    /// Sample the next spawn. `None` when there is nothing to sample from.
    pub fn plan<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        intersections: &BTreeMap<IntersectionId, Intersection>,
        profiles: &[ClassProfile],
    ) -> Option<SpawnPlan> {
        let ids: Vec<IntersectionId> = intersections.keys().copied().collect();
        let intersection = match self.selection {
            IntersectionSelection::Uniform => *ids.choose(rng)?,
            IntersectionSelection::RoundRobin => {
                if ids.is_empty() {
                    return None;
                }
                let id = ids[self.round_robin_cursor % ids.len()];
                self.round_robin_cursor = self.round_robin_cursor.wrapping_add(1);
                id
            }
        };

        let lane = self.pick_lane(rng);
        let profile = *profiles.choose(rng)?;
        let direction = *intersections
            .get(&intersection)?
            .allowed_spawn_directions
            .choose(rng)?;

        Some(SpawnPlan {
            intersection,
            direction,
            lane,
            profile,
        })
    }

    fn pick_lane<R: Rng + ?Sized>(&self, rng: &mut R) -> Lane {
        match self.weighting {
            LaneWeighting::Uniform => Lane::ALL[rng.random_range(0..Lane::ALL.len())],
            LaneWeighting::StraightBiased => {
                let roll: f32 = rng.random();
                if roll < 0.6 {
                    Lane::Straight
                } else if roll < 0.8 {
                    Lane::LeftTurn
                } else {
                    Lane::RightTurn
                }
            }
        }
    }
}
