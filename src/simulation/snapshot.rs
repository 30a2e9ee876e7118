//! Read-only views of the world for front-ends
//!
//! A snapshot is a plain serde value; it can be serialized to JSON and handed
//! to another thread without touching the live world again.

use serde::Serialize;

use super::config::ControllerMode;
use super::signal::{SignalState, Suggestion};
use super::types::{Direction, IntersectionId, Lane, VehicleClass, VehicleId};

#[derive(Debug, Clone, Serialize)]
pub struct DirectionSnapshot {
    pub direction: Direction,
    /// Compass side the traffic comes from
    pub label: &'static str,
    pub signal: SignalState,
    /// Spawned plus handed-in vehicles
    pub spawned: usize,
    pub crossed: usize,
    pub remaining: usize,
    pub wait_cycles: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntersectionSnapshot {
    pub id: IntersectionId,
    pub name: String,
    pub mode: ControllerMode,
    pub directions: Vec<DirectionSnapshot>,
    pub suggestion: Suggestion,
    pub pending_override: Option<Direction>,
    pub throughput_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub intersection: IntersectionId,
    pub direction: Direction,
    pub lane: Lane,
    pub class: VehicleClass,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub crossed: bool,
    pub turned: bool,
}

/// Everything a renderer or dashboard needs for one frame
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSnapshot {
    pub tick: u64,
    pub elapsed_secs: f32,
    pub intersections: Vec<IntersectionSnapshot>,
    pub vehicles: Vec<VehicleSnapshot>,
    pub total_spawned: usize,
    pub total_crossed: usize,
    pub throughput_pct: f32,
}

impl SimulationSnapshot {
    pub fn intersection(&self, id: IntersectionId) -> Option<&IntersectionSnapshot> {
        self.intersections.iter().find(|i| i.id == id)
    }
}

/// `crossed / arrived` as a percentage, 0 when nothing arrived
pub fn throughput_pct(crossed: usize, arrived: usize) -> f32 {
    if arrived == 0 {
        0.0
    } else {
        crossed as f32 / arrived as f32 * 100.0
    }
}
