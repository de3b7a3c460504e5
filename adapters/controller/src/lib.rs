#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Thread-safe crowd controller driving the simulation on a fixed timestep.
//!
//! All mutable state lives behind a single mutex. The tick thread and every
//! external operation take that lock for the whole of their body, so readers
//! only ever observe complete snapshots.

mod simulation;

use std::{
    io,
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, LockResult, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crowd_sim_core::{
    AgentId, AgentState, Command, CrowdState, Event, FieldDimensions, Timestamp,
};
use crowd_sim_system_size_events::Config as ScheduleConfig;
use crowd_sim_world::{CrowdConfig, WalkableField};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::simulation::Simulation;

/// Transport-facing surface of a running crowd.
pub trait CrowdService: Send + Sync {
    /// Latest published snapshot.
    fn snapshot(&self) -> Arc<CrowdState>;

    /// Moves an agent, clamped into the field and snapped onto walkable ground.
    ///
    /// Returns `false` when the agent does not exist.
    fn move_agent(&self, agent: AgentId, x: f32, y: f32) -> bool;

    /// Sets the agent's state explicitly, or flips it when `desired` is `None`.
    ///
    /// Returns `false` when the agent does not exist.
    fn toggle_agent(&self, agent: AgentId, desired: Option<AgentState>) -> bool;

    /// Replaces the crowd with a freshly seeded one.
    fn reset(&self);

    /// Dimensions of the walkable field.
    fn field_dimensions(&self) -> FieldDimensions;
}

/// Parameters needed to build a [`CrowdController`].
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Simulated time advanced per tick, also the tick thread period.
    pub tick_interval: Duration,
    /// Seed for every random source in the simulation.
    pub seed: u64,
    /// Initial reading of the simulation clock.
    pub epoch: Timestamp,
    /// Population and spawn parameters.
    pub crowd: CrowdConfig,
    /// Size-event schedule timings.
    pub schedule: ScheduleConfig,
    /// Blend factor of the presentation smoothing.
    pub smoothing_factor: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1) / 30,
            seed: 0,
            epoch: wall_clock(),
            crowd: CrowdConfig::default(),
            schedule: ScheduleConfig::default(),
            smoothing_factor: crowd_sim_system_smoothing::DEFAULT_FACTOR,
        }
    }
}

/// Current UNIX time as a simulation timestamp.
#[must_use]
pub fn wall_clock() -> Timestamp {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();
    Timestamp::from_secs(seconds)
}

/// Errors raised while managing the tick thread.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The operating system refused to start the tick thread.
    #[error("failed to spawn tick thread")]
    Spawn(#[from] io::Error),
}

#[derive(Debug)]
struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the simulation and its optional background tick thread.
#[derive(Debug)]
pub struct CrowdController {
    shared: Arc<Mutex<Simulation>>,
    dimensions: FieldDimensions,
    tick_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl CrowdController {
    /// Builds the simulation without starting the tick thread.
    #[must_use]
    pub fn new(field: Arc<WalkableField>, config: ControllerConfig) -> Self {
        let dimensions = field.dimensions();
        let simulation = Simulation::new(field, &config);
        Self {
            shared: Arc::new(Mutex::new(simulation)),
            dimensions,
            tick_interval: config.tick_interval,
            worker: Mutex::new(None),
        }
    }

    /// Builds the simulation and starts ticking it in the background.
    pub fn spawn(
        field: Arc<WalkableField>,
        config: ControllerConfig,
    ) -> Result<Self, ControllerError> {
        let controller = Self::new(field, config);
        controller.start()?;
        Ok(controller)
    }

    /// Starts the tick thread. Does nothing when it is already running.
    pub fn start(&self) -> Result<(), ControllerError> {
        let mut worker = recover(self.worker.lock());
        if worker.is_some() {
            return Ok(());
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = self.tick_interval;
        let handle = thread::Builder::new()
            .name("crowd-tick".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => recover(shared.lock()).tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    deadline = next_deadline(deadline, interval, Instant::now());
                }
            })?;

        info!(interval_ms = interval.as_millis() as u64, "tick thread started");
        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Signals the tick thread and waits for any in-flight tick to finish.
    pub fn stop(&self) {
        let Some(worker) = recover(self.worker.lock()).take() else {
            return;
        };
        let _ = worker.stop.send(());
        if worker.handle.join().is_err() {
            warn!("tick thread panicked before stopping");
        } else {
            info!("tick thread stopped");
        }
    }

    /// Reports whether the tick thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        recover(self.worker.lock()).is_some()
    }

    /// Runs a single tick on the calling thread.
    pub fn tick_once(&self) {
        self.simulation().tick();
    }

    fn simulation(&self) -> MutexGuard<'_, Simulation> {
        recover(self.shared.lock())
    }
}

impl CrowdService for CrowdController {
    fn snapshot(&self) -> Arc<CrowdState> {
        self.simulation().published()
    }

    fn move_agent(&self, agent: AgentId, x: f32, y: f32) -> bool {
        let events = self
            .simulation()
            .execute_external(Command::MoveAgent { agent, x, y });
        let moved = events
            .iter()
            .any(|event| matches!(event, Event::AgentMoved { .. }));
        debug!(agent = agent.get(), x, y, moved, "move requested");
        moved
    }

    fn toggle_agent(&self, agent: AgentId, desired: Option<AgentState>) -> bool {
        let events = self
            .simulation()
            .execute_external(Command::SetAgentState { agent, desired });
        let accepted = !events
            .iter()
            .any(|event| matches!(event, Event::CommandRejected { .. }));
        debug!(agent = agent.get(), ?desired, accepted, "state change requested");
        accepted
    }

    fn reset(&self) {
        let events = self.simulation().execute_external(Command::ResetCrowd);
        if let Some(Event::CrowdReset { population, .. }) = events.first() {
            info!(population, "crowd reset");
        }
    }

    fn field_dimensions(&self) -> FieldDimensions {
        self.dimensions
    }
}

impl Drop for CrowdController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recover<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("recovering poisoned controller lock");
        poisoned.into_inner()
    })
}

/// Advances the tick deadline by one interval. A loop that fell more than an
/// interval behind resumes from `now` instead of bursting through missed ticks.
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next + interval < now {
        now
    } else {
        next
    }
}
