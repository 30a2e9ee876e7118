//! Background runner
//!
//! The world lives behind `Arc<Mutex<_>>`. A worker thread steps it a frame
//! at a time and publishes a snapshot after each frame; between frames it
//! blocks on its command channel, so a stop request is seen within one frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use super::snapshot::SimulationSnapshot;
use super::types::{Direction, IntersectionId};
use super::world::SimWorld;

/// Single-slot mailbox: publishing replaces whatever was there, readers only
/// ever see the newest frame
#[derive(Debug)]
pub struct LatestFrame<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // a panicked publisher leaves at worst a stale frame behind
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, frame: T) {
        *self.lock() = Some(frame);
        self.ready.notify_all();
    }

    /// Take the newest frame, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Wait up to `timeout` for a frame, then take it
    pub fn wait_take(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

#[derive(Debug)]
enum Command {
    Stop,
}

/// How the worker paces itself
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Ticks stepped between two published frames
    pub ticks_per_frame: u32,
    /// Sleep between frames so simulated time tracks wall-clock time
    pub realtime: bool,
    /// Stop once the world reports its time limit reached
    pub stop_at_time_limit: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ticks_per_frame: 1,
            realtime: true,
            stop_at_time_limit: true,
        }
    }
}

struct Worker {
    commands: mpsc::Sender<Command>,
    thread: JoinHandle<()>,
}

/// Owns a world and the thread that steps it
pub struct SimulationHandle {
    world: Arc<Mutex<SimWorld>>,
    frames: Arc<LatestFrame<SimulationSnapshot>>,
    running: Arc<AtomicBool>,
    config: RunnerConfig,
    worker: Option<Worker>,
}

impl SimulationHandle {
    pub fn new(world: SimWorld, config: RunnerConfig) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
            frames: Arc::new(LatestFrame::new()),
            running: Arc::new(AtomicBool::new(false)),
            config,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared frame slot, for consumers on other threads
    pub fn frames(&self) -> Arc<LatestFrame<SimulationSnapshot>> {
        Arc::clone(&self.frames)
    }

    pub fn latest_frame(&self) -> Option<SimulationSnapshot> {
        self.frames.take()
    }

    /// Run `f` against the locked world
    pub fn with_world<R>(&self, f: impl FnOnce(&mut SimWorld) -> R) -> Result<R> {
        let mut world = self
            .world
            .lock()
            .map_err(|_| anyhow!("World mutex poisoned"))?;
        Ok(f(&mut world))
    }

    pub fn snapshot(&self) -> Result<SimulationSnapshot> {
        self.with_world(|world| world.snapshot())
    }

    /// Queue a direction as the next green; validated before the controller sees it
    pub fn request_green(
        &self,
        intersection: IntersectionId,
        direction: &str,
    ) -> Result<Direction> {
        self.with_world(|world| world.set_override(intersection, direction))?
    }

    pub fn start(&mut self) -> Result<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        // reap a worker that ended on its own
        self.join_worker()?;

        let (commands, receiver) = mpsc::channel();
        let world = Arc::clone(&self.world);
        let frames = Arc::clone(&self.frames);
        let running = Arc::clone(&self.running);
        let config = self.config;
        let frame_interval = if config.realtime {
            let tick = self.with_world(|world| world.clock.tick_interval())?;
            tick * config.ticks_per_frame.max(1)
        } else {
            Duration::ZERO
        };

        self.running.store(true, Ordering::SeqCst);
        let thread = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                run_worker(world, frames, &running, receiver, config, frame_interval);
                running.store(false, Ordering::SeqCst);
            })
            .context("Failed to spawn simulation thread")?;

        self.worker = Some(Worker { commands, thread });
        info!("Simulation started");
        Ok(StartOutcome::Started)
    }

    pub fn stop(&mut self) -> Result<StopOutcome> {
        let Some(worker) = self.worker.as_ref() else {
            return Ok(StopOutcome::AlreadyStopped);
        };
        let was_running = self.is_running();
        // the worker may already have exited, in which case the send fails
        let _ = worker.commands.send(Command::Stop);
        self.join_worker()?;
        self.running.store(false, Ordering::SeqCst);

        if was_running {
            info!("Simulation stopped");
            Ok(StopOutcome::Stopped)
        } else {
            Ok(StopOutcome::AlreadyStopped)
        }
    }

    /// Block until the worker exits on its own (time limit) or is stopped
    pub fn wait(&mut self) -> Result<()> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker
                .thread
                .join()
                .map_err(|_| anyhow!("Simulation thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop simulation: {:#}", e);
        }
    }
}

fn run_worker(
    world: Arc<Mutex<SimWorld>>,
    frames: Arc<LatestFrame<SimulationSnapshot>>,
    running: &AtomicBool,
    commands: mpsc::Receiver<Command>,
    config: RunnerConfig,
    frame_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match commands.recv_timeout(frame_interval) {
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let (snapshot, finished) = {
            let Ok(mut world) = world.lock() else {
                warn!("World mutex poisoned, stopping simulation thread");
                break;
            };
            for _ in 0..config.ticks_per_frame.max(1) {
                world.tick();
            }
            let finished = config.stop_at_time_limit && world.is_finished();
            if finished {
                world.log_final_stats();
            }
            (world.snapshot(), finished)
        };
        frames.publish(snapshot);

        if finished {
            break;
        }
    }
}
