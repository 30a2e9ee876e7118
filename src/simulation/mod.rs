//! Intersection simulation module
//!
//! This module contains all the traffic signal simulation logic. It runs
//! headless and can be driven tick by tick from tests or from the threaded
//! runner.

mod clock;
mod config;
mod coordinator;
mod intersection;
mod lane_registry;
mod runner;
mod signal;
mod snapshot;
mod spawner;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
pub use clock::SimClock;
pub use config::{
    default_simultaneous, left_turn_pivot, turn_offset, ClassProfile, ControllerMode,
    DirectionTable, IntersectionConfig, IntersectionSelection, LaneWeighting, SignalTiming,
    SimConfig, SpawnConfig, TopologyConfig, VehicleClassConfig,
};
pub use coordinator::Coordinator;
pub use intersection::{Approach, Intersection, QueueTail};
pub use lane_registry::{LaneQueue, LaneRegistry, QueueCounts};
pub use runner::{LatestFrame, RunnerConfig, SimulationHandle, StartOutcome, StopOutcome};
pub use signal::{
    CongestionView, ControllerState, LaneSignal, SignalController, SignalDisplay, SignalPhase,
    SignalState, Suggestion,
};
pub use snapshot::{
    throughput_pct, DirectionSnapshot, IntersectionSnapshot, SimulationSnapshot, VehicleSnapshot,
};
pub use spawner::{SpawnPlan, Spawner};
pub use types::{
    Axis, Direction, Footprint, IntersectionId, Lane, Position, Rect, SimId, VehicleClass,
    VehicleId, DEFAULT_FOOTPRINT, MOVING_GAP, ROTATION_STEP, STOPPING_GAP,
};
pub use vehicle::{OtherVehicle, Vehicle, VehicleContext, VehicleUpdateResult};
pub use world::{RunStats, SimWorld};
