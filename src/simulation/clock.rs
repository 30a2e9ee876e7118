//! Discrete simulation clock
//!
//! Physics advances every tick; the signal controller advances once per
//! simulated second, i.e. every `tick_rate` ticks.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SimClock {
    tick: u64,
    tick_rate: u32,
}

impl SimClock {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick: 0,
            tick_rate: tick_rate.max(1),
        }
    }

    /// Advance one tick. Returns true when the new tick closes a simulated second.
    pub fn advance(&mut self) -> bool {
        self.tick += 1;
        self.tick % u64::from(self.tick_rate) == 0
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Whole simulated seconds elapsed
    pub fn seconds(&self) -> u64 {
        self.tick / u64::from(self.tick_rate)
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.tick as f32 / self.tick_rate as f32
    }

    /// Number of ticks covering `secs` simulated seconds (at least one)
    pub fn ticks_for(&self, secs: f32) -> u64 {
        ((secs * self.tick_rate as f32).round() as u64).max(1)
    }

    /// Wall-clock length of one tick when running in real time
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate))
    }
}
