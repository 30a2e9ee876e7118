//! Signal controller for one intersection
//!
//! The controller holds all approaches red during startup, then repeatedly
//! picks a primary direction, grants it (and the fixed partner's left turn)
//! green for a duration sized to the queue, and counts the phase down once
//! per simulated second.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use super::config::{ControllerMode, SignalTiming};
use super::lane_registry::QueueCounts;
use super::types::{Direction, IntersectionId, Lane};

/// Countdown for a single lane's green and the yellow that follows it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaneSignal {
    pub green: u32,
    pub yellow: u32,
}

impl LaneSignal {
    pub fn new(green: u32) -> Self {
        Self { green, yellow: 0 }
    }

    pub fn is_green(&self) -> bool {
        self.green > 0
    }

    pub fn is_yellow(&self) -> bool {
        self.green == 0 && self.yellow > 0
    }

    pub fn is_active(&self) -> bool {
        self.green > 0 || self.yellow > 0
    }

    /// Count down one second. Returns true when the green just ran out.
    fn tick(&mut self, yellow_secs: u32) -> bool {
        if self.green > 0 {
            self.green -= 1;
            if self.green == 0 {
                self.yellow = yellow_secs;
                return true;
            }
        } else if self.yellow > 0 {
            self.yellow -= 1;
        }
        false
    }

    /// Seconds until both green and yellow are over
    fn remaining(&self, yellow_secs: u32) -> u32 {
        if self.green > 0 {
            self.green + yellow_secs
        } else {
            self.yellow
        }
    }
}

/// Green allocation for one primary direction and its partner's left turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalPhase {
    pub primary: Direction,
    pub partner: Direction,
    /// Primary lanes in lane order
    pub lanes: [LaneSignal; 3],
    pub partner_left: LaneSignal,
    /// Overall green countdown, the longest lane green
    pub green_remaining: u32,
    yellow_secs: u32,
}

impl SignalPhase {
    /// Seconds until every lane has finished green and yellow
    pub fn remaining_secs(&self) -> u32 {
        self.lanes
            .iter()
            .chain(std::iter::once(&self.partner_left))
            .map(|lane| lane.remaining(self.yellow_secs))
            .max()
            .unwrap_or(0)
            .max(self.green_remaining)
    }

    pub fn is_finished(&self) -> bool {
        self.green_remaining == 0
            && !self.partner_left.is_active()
            && self.lanes.iter().all(|lane| !lane.is_active())
    }

    fn signal(&self, direction: Direction, lane: Lane) -> Option<&LaneSignal> {
        if direction == self.primary {
            Some(&self.lanes[lane.index()])
        } else if direction == self.partner && lane == Lane::LeftTurn {
            Some(&self.partner_left)
        } else {
            None
        }
    }

    /// Count down one second, returning the movements whose green expired
    fn tick(&mut self) -> Vec<(Direction, Lane)> {
        let mut expired = Vec::new();
        for lane in Lane::ALL {
            if self.lanes[lane.index()].tick(self.yellow_secs) {
                expired.push((self.primary, lane));
            }
        }
        if self.partner_left.tick(self.yellow_secs) {
            expired.push((self.partner, Lane::LeftTurn));
        }
        self.green_remaining = self.green_remaining.saturating_sub(1);
        expired
    }
}

/// Neighbor queue depth each movement feeds into, `None` when it leaves the
/// network or the neighbor is unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CongestionView(pub [[Option<usize>; 3]; 4]);

impl CongestionView {
    pub fn depth(&self, direction: Direction, lane: Lane) -> Option<usize> {
        self.0[direction.index()][lane.index()]
    }

    pub fn set(&mut self, direction: Direction, lane: Lane, depth: Option<usize>) {
        self.0[direction.index()][lane.index()] = depth;
    }
}

/// Where the controller is in its cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    /// All red while the intersection fills up
    Startup { remaining: u32 },
    /// All red until an operator picks a direction (manual mode only)
    AwaitingOverride,
    Active(SignalPhase),
}

/// Adaptive choice offered to an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub direction: Direction,
    pub vehicles: usize,
    pub green_secs: u32,
}

/// What a signal head shows for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalDisplay {
    #[serde(rename = "RED")]
    Red,
    #[serde(rename = "GREEN")]
    Green,
    #[serde(rename = "YELLOW")]
    Yellow,
    #[serde(rename = "GREEN-LEFT")]
    GreenLeft,
    #[serde(rename = "YELLOW-LEFT")]
    YellowLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalState {
    pub display: SignalDisplay,
    pub countdown: u32,
}

/// Phase state machine for one intersection
#[derive(Debug, Clone)]
pub struct SignalController {
    intersection: IntersectionId,
    mode: ControllerMode,
    timing: SignalTiming,
    pairing: BTreeMap<Direction, Direction>,
    state: ControllerState,
    /// Selections each direction has gone unchosen, in direction order
    wait_cycles: [u32; 4],
    last_green: Option<Direction>,
    pending_override: Option<Direction>,
    phases_started: u64,
}

impl SignalController {
    pub fn new(
        intersection: IntersectionId,
        mode: ControllerMode,
        timing: SignalTiming,
        startup_secs: u32,
        pairing: BTreeMap<Direction, Direction>,
    ) -> Self {
        let state = if startup_secs > 0 {
            ControllerState::Startup {
                remaining: startup_secs,
            }
        } else if mode == ControllerMode::Manual {
            ControllerState::AwaitingOverride
        } else {
            ControllerState::Startup { remaining: 0 }
        };
        Self {
            intersection,
            mode,
            timing,
            pairing,
            state,
            wait_cycles: [0; 4],
            last_green: None,
            pending_override: None,
            phases_started: 0,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn phase(&self) -> Option<&SignalPhase> {
        match &self.state {
            ControllerState::Active(phase) => Some(phase),
            _ => None,
        }
    }

    pub fn wait_cycles(&self, direction: Direction) -> u32 {
        self.wait_cycles[direction.index()]
    }

    pub fn pending_override(&self) -> Option<Direction> {
        self.pending_override
    }

    pub fn phases_started(&self) -> u64 {
        self.phases_started
    }

    /// Direction whose left turn runs alongside `direction`
    pub fn partner_of(&self, direction: Direction) -> Direction {
        self.pairing
            .get(&direction)
            .copied()
            .unwrap_or_else(|| direction.left_of())
    }

    /// Whether vehicles in `direction`/`lane` may pass the stop line
    pub fn is_green(&self, direction: Direction, lane: Lane) -> bool {
        self.phase()
            .and_then(|phase| phase.signal(direction, lane))
            .is_some_and(LaneSignal::is_green)
    }

    /// Queue `direction` as the next primary green. Replaces an earlier request.
    pub fn request_green(&mut self, direction: Direction) {
        debug!(
            "{}: override requested for {} ({})",
            self.intersection,
            direction,
            direction.label()
        );
        self.pending_override = Some(direction);
    }

    /// Advance one simulated second.
    ///
    /// Returns the movements whose green ran out during this second, so the
    /// caller can release vehicles queued behind them.
    pub fn on_second(
        &mut self,
        counts: &QueueCounts,
        congestion: &CongestionView,
    ) -> Vec<(Direction, Lane)> {
        let mut expired = Vec::new();
        let ready = match &mut self.state {
            ControllerState::Startup { remaining } => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            ControllerState::AwaitingOverride => true,
            ControllerState::Active(phase) => {
                expired = phase.tick();
                phase.is_finished()
            }
        };

        if ready {
            self.state = match self.next_phase(counts, congestion) {
                Some(phase) => ControllerState::Active(phase),
                None => ControllerState::AwaitingOverride,
            };
        }
        expired
    }

    /// Start the next phase, consuming a pending override.
    /// Manual mode yields `None` while nothing is pending.
    fn next_phase(
        &mut self,
        counts: &QueueCounts,
        congestion: &CongestionView,
    ) -> Option<SignalPhase> {
        let requested = self.pending_override.take();
        let phase = match (self.mode, requested) {
            (ControllerMode::Manual, None) => return None,
            (ControllerMode::Manual, Some(direction)) => self.manual_phase(direction),
            (ControllerMode::Adaptive, Some(direction)) => {
                self.build_phase(direction, counts, congestion)
            }
            (ControllerMode::Adaptive, None) => {
                let direction = self.choose_direction(counts);
                self.build_phase(direction, counts, congestion)
            }
        };

        for direction in Direction::ALL {
            let wait = &mut self.wait_cycles[direction.index()];
            if direction == phase.primary {
                *wait = 0;
            } else {
                *wait += 1;
            }
        }
        self.last_green = Some(phase.primary);
        self.phases_started += 1;

        debug!(
            "{}: phase {} green {} ({}) + {} left, lanes {:?}, partner {}s, {}s total, remaining {}",
            self.intersection,
            self.phases_started,
            phase.primary,
            phase.primary.label(),
            phase.partner,
            phase.lanes.map(|lane| lane.green),
            phase.partner_left.green,
            phase.green_remaining,
            counts.direction(phase.primary)
        );
        Some(phase)
    }

    /// Adaptive direction choice: serve a starved direction first, otherwise
    /// the longest queue other than the one just served
    pub fn choose_direction(&self, counts: &QueueCounts) -> Direction {
        let starved = Direction::ALL
            .iter()
            .copied()
            .filter(|&d| {
                self.wait_cycles[d.index()] >= self.timing.starvation_limit
                    && counts.direction(d) > 0
            })
            .fold(None, |best: Option<Direction>, d| match best {
                Some(b)
                    if (self.wait_cycles[b.index()], counts.direction(b))
                        >= (self.wait_cycles[d.index()], counts.direction(d)) =>
                {
                    Some(b)
                }
                _ => Some(d),
            });
        if let Some(direction) = starved {
            return direction;
        }

        let loaded: Vec<Direction> = Direction::ALL
            .iter()
            .copied()
            .filter(|&d| counts.direction(d) > 0)
            .collect();
        let candidates: Vec<Direction> = if loaded.len() > 1 {
            loaded
                .iter()
                .copied()
                .filter(|&d| Some(d) != self.last_green)
                .collect()
        } else {
            loaded
        };

        candidates
            .iter()
            .copied()
            .fold(None, |best: Option<Direction>, d| match best {
                Some(b) if counts.direction(b) >= counts.direction(d) => Some(b),
                _ => Some(d),
            })
            .unwrap_or(Direction::ALL[0])
    }

    /// Vehicles a lane may release given the neighbor it feeds.
    /// `None` means the lane is held red.
    fn throttled_count(&self, remaining: usize, depth: Option<usize>) -> Option<usize> {
        let ceiling = self.timing.congestion_ceiling;
        match depth {
            None => Some(remaining),
            Some(depth) if depth >= ceiling => None,
            Some(depth) => Some(remaining.min(ceiling - depth)),
        }
    }

    fn lane_green(
        &self,
        direction: Direction,
        lane: Lane,
        counts: &QueueCounts,
        congestion: &CongestionView,
    ) -> u32 {
        match self.throttled_count(counts.lane(direction, lane), congestion.depth(direction, lane))
        {
            Some(count) => self.timing.green_for(count),
            None => {
                debug!(
                    "{}: holding {} lane {} red, neighbor queue is full",
                    self.intersection, direction, lane
                );
                0
            }
        }
    }

    /// Size the green for `primary` and its partner's left turn
    pub fn build_phase(
        &self,
        primary: Direction,
        counts: &QueueCounts,
        congestion: &CongestionView,
    ) -> SignalPhase {
        let partner = self.partner_of(primary);
        let lanes = Lane::ALL
            .map(|lane| LaneSignal::new(self.lane_green(primary, lane, counts, congestion)));
        let partner_left =
            LaneSignal::new(self.lane_green(partner, Lane::LeftTurn, counts, congestion));
        let longest = lanes
            .iter()
            .chain(std::iter::once(&partner_left))
            .map(|lane| lane.green)
            .max()
            .unwrap_or(0);
        SignalPhase {
            primary,
            partner,
            lanes,
            partner_left,
            // an all-held phase still lasts min_green so the cycle keeps moving
            green_remaining: longest.max(self.timing.min_green).max(1),
            yellow_secs: self.timing.yellow,
        }
    }

    fn manual_phase(&self, primary: Direction) -> SignalPhase {
        let green = self.timing.manual_green.max(1);
        SignalPhase {
            primary,
            partner: self.partner_of(primary),
            lanes: [LaneSignal::new(green); 3],
            partner_left: LaneSignal::new(green),
            green_remaining: green,
            yellow_secs: self.timing.yellow,
        }
    }

    /// What the adaptive rule would pick right now
    pub fn suggestion(&self, counts: &QueueCounts, congestion: &CongestionView) -> Suggestion {
        let direction = self.choose_direction(counts);
        let phase = self.build_phase(direction, counts, congestion);
        Suggestion {
            direction,
            vehicles: counts.direction(direction),
            green_secs: phase.green_remaining,
        }
    }

    /// Signal head state for every direction, in direction order
    pub fn display(&self) -> [SignalState; 4] {
        let red = |countdown| SignalState {
            display: SignalDisplay::Red,
            countdown,
        };
        match &self.state {
            ControllerState::Startup { remaining } => [red(*remaining); 4],
            ControllerState::AwaitingOverride => [red(0); 4],
            ControllerState::Active(phase) => {
                let phase_left = phase.remaining_secs();
                Direction::ALL.map(|direction| {
                    if direction == phase.primary {
                        let green = phase.lanes.iter().map(|l| l.green).max().unwrap_or(0);
                        let yellow = phase.lanes.iter().map(|l| l.yellow).max().unwrap_or(0);
                        if green > 0 {
                            SignalState {
                                display: SignalDisplay::Green,
                                countdown: green,
                            }
                        } else if yellow > 0 {
                            SignalState {
                                display: SignalDisplay::Yellow,
                                countdown: yellow,
                            }
                        } else {
                            red(phase_left)
                        }
                    } else if direction == phase.partner && phase.partner_left.is_green() {
                        SignalState {
                            display: SignalDisplay::GreenLeft,
                            countdown: phase.partner_left.green,
                        }
                    } else if direction == phase.partner && phase.partner_left.is_yellow() {
                        SignalState {
                            display: SignalDisplay::YellowLeft,
                            countdown: phase.partner_left.yellow,
                        }
                    } else {
                        red(phase_left)
                    }
                })
            }
        }
    }
}
