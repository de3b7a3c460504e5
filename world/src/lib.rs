#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative crowd state for the simulation engine.
//!
//! The [`World`] owns every agent, the simulation clock, and the random
//! source used by the field and agent kinematics. It only changes through
//! [`apply`], which reports each mutation as an [`Event`].

mod agent;
mod color;
mod field;
mod morphology;

use std::sync::Arc;

use crowd_sim_core::{
    AgentId, AgentState, Command, Event, Position, RejectionReason, Timestamp,
};
use rand::{distributions::uniform::SampleUniform, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::agent::Agent;

pub use agent::AgentTuning;
pub use field::{FieldConfig, FieldError, WalkableField};

/// Population and spawn parameters of the crowd.
#[derive(Clone, Debug, PartialEq)]
pub struct CrowdConfig {
    /// Hard cap on the number of live agents.
    pub max_agents: usize,
    /// Smallest population seeded by a reset.
    pub reset_min: usize,
    /// Largest population seeded by a reset.
    pub reset_max: usize,
    /// Distance from the field edges kept by top-up spawns.
    pub spawn_margin: u32,
    /// Standard deviation in pixels of reset positions around the cluster origin.
    pub cluster_spread: f32,
    /// Upper bound in seconds of the random back-dating applied to new agents.
    pub promotion_backdate_max: f64,
    /// Motion constants for spawned agents.
    pub agent: AgentTuning,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            max_agents: 24,
            reset_min: 5,
            reset_max: 7,
            spawn_margin: 12,
            cluster_spread: 40.0,
            promotion_backdate_max: 120.0,
            agent: AgentTuning::default(),
        }
    }
}

/// Represents the authoritative crowd state.
#[derive(Debug)]
pub struct World {
    field: Arc<WalkableField>,
    config: CrowdConfig,
    agents: Vec<Agent>,
    next_id: u32,
    clock: Timestamp,
    rng: ChaCha8Rng,
}

impl World {
    /// Creates a world whose clock starts at `epoch` and seeds a fresh crowd.
    #[must_use]
    pub fn new(field: Arc<WalkableField>, config: CrowdConfig, seed: u64, epoch: Timestamp) -> Self {
        let mut world = Self::empty(field, config, seed, epoch);
        let mut events = Vec::new();
        world.reset_crowd(&mut events);
        world
    }

    fn empty(field: Arc<WalkableField>, config: CrowdConfig, seed: u64, epoch: Timestamp) -> Self {
        Self {
            field,
            config,
            agents: Vec::new(),
            next_id: 0,
            clock: epoch,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Creates a world populated with the provided agents instead of a random crowd.
    #[cfg(feature = "agent_scaffolding")]
    #[must_use]
    pub fn with_agents(
        field: Arc<WalkableField>,
        config: CrowdConfig,
        seed: u64,
        epoch: Timestamp,
        seeds: impl IntoIterator<Item = AgentSeed>,
    ) -> Self {
        let mut world = Self::empty(field, config, seed, epoch);
        for placed in seeds {
            let id = world.allocate_id();
            let mut agent = Agent::spawn(
                id,
                placed.position,
                placed.last_promoted_at,
                &world.config.agent,
                &mut world.rng,
            );
            agent.state = placed.state;
            world.agents.push(agent);
        }
        world
    }

    fn allocate_id(&mut self) -> AgentId {
        let id = AgentId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn agent_mut(&mut self, agent: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|candidate| candidate.id == agent)
    }

    fn advance(&mut self, dt: f32) {
        let field = &self.field;
        let escape_attempts = self.config.agent.escape_attempts;
        for agent in &mut self.agents {
            agent.step(field, dt, escape_attempts, &mut self.rng);
        }
    }

    fn spawn_at(&mut self, position: Position) -> AgentId {
        let id = self.allocate_id();
        let backdate = uniform(&mut self.rng, 0.0, self.config.promotion_backdate_max);
        let agent = Agent::spawn(
            id,
            position,
            self.clock.offset_by(-backdate),
            &self.config.agent,
            &mut self.rng,
        );
        self.agents.push(agent);
        id
    }

    fn spawn_agents(&mut self, count: usize, out_events: &mut Vec<Event>) {
        let spare = self.config.max_agents.saturating_sub(self.agents.len());
        for _ in 0..count.min(spare) {
            let pixel = self
                .field
                .random_walkable_point(self.config.spawn_margin, &mut self.rng);
            let position = self.field.snap_to_walkable(pixel.into(), &mut self.rng);
            let agent = self.spawn_at(position);
            out_events.push(Event::AgentSpawned { agent, position });
        }
    }

    fn reset_crowd(&mut self, out_events: &mut Vec<Event>) {
        self.agents.clear();

        let upper = self.config.reset_max.max(self.config.reset_min);
        let population = self
            .rng
            .gen_range(self.config.reset_min..=upper)
            .min(self.config.max_agents);
        let origin = self.field.cluster_origin(&mut self.rng);
        let spread = Normal::new(0.0_f32, self.config.cluster_spread).ok();
        debug!(population, x = origin.x, y = origin.y, "seeding crowd");

        out_events.push(Event::CrowdReset {
            at: self.clock,
            population,
        });
        for _ in 0..population {
            let (dx, dy) = spread.map_or((0.0, 0.0), |normal| {
                (normal.sample(&mut self.rng), normal.sample(&mut self.rng))
            });
            let candidate = Position::new(origin.x + dx, origin.y + dy);
            let position = self.field.snap_to_walkable(candidate, &mut self.rng);
            let agent = self.spawn_at(position);
            out_events.push(Event::AgentSpawned { agent, position });
        }
    }

    fn move_agent(&mut self, agent: AgentId, x: f32, y: f32, out_events: &mut Vec<Event>) {
        let Some(index) = self.agents.iter().position(|candidate| candidate.id == agent) else {
            out_events.push(Event::CommandRejected {
                agent,
                reason: RejectionReason::UnknownAgent,
            });
            return;
        };

        let dimensions = self.field.dimensions();
        let requested = Position::new(
            clamp_axis(x, dimensions.width),
            clamp_axis(y, dimensions.height),
        );
        let position = self.field.snap_to_walkable(requested, &mut self.rng);
        self.agents[index].position = position;
        out_events.push(Event::AgentMoved { agent, position });
    }

    fn set_state(
        &mut self,
        agent: AgentId,
        desired: Option<AgentState>,
        out_events: &mut Vec<Event>,
    ) {
        let now = self.clock;
        let Some(target) = self.agent_mut(agent) else {
            out_events.push(Event::CommandRejected {
                agent,
                reason: RejectionReason::UnknownAgent,
            });
            return;
        };

        let next = desired.unwrap_or(target.state.toggled());
        if next == target.state {
            return;
        }
        target.state = next;
        match next {
            AgentState::Large => {
                target.last_promoted_at = now;
                out_events.push(Event::AgentPromoted { agent, at: now });
            }
            AgentState::Small => out_events.push(Event::AgentDemoted { agent, at: now }),
        }
    }
}

/// Initial state of an agent placed through [`World::with_agents`].
#[cfg(feature = "agent_scaffolding")]
#[derive(Clone, Copy, Debug)]
pub struct AgentSeed {
    /// Starting position.
    pub position: Position,
    /// Starting size state.
    pub state: AgentState,
    /// Recorded time of the last promotion.
    pub last_promoted_at: Timestamp,
}

/// Applies the provided command to the world, reporting every mutation.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.clock = world.clock.advanced_by(dt);
            world.advance(dt.as_secs_f32());
            out_events.push(Event::TimeAdvanced {
                dt,
                now: world.clock,
            });
        }
        Command::MoveAgent { agent, x, y } => world.move_agent(agent, x, y, out_events),
        Command::SetAgentState { agent, desired } => world.set_state(agent, desired, out_events),
        Command::SpawnAgents { count } => world.spawn_agents(count, out_events),
        Command::ResetCrowd => world.reset_crowd(out_events),
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use crowd_sim_core::{AgentView, FieldDimensions, StateCounts, Timestamp};

    use super::{CrowdConfig, WalkableField, World};

    /// Captures a read-only view of every agent.
    #[must_use]
    pub fn agent_view(world: &World) -> AgentView {
        AgentView::from_snapshots(world.agents.iter().map(|agent| agent.snapshot()).collect())
    }

    /// Current reading of the simulation clock.
    #[must_use]
    pub fn clock(world: &World) -> Timestamp {
        world.clock
    }

    /// Walkable field the crowd moves on.
    #[must_use]
    pub fn field(world: &World) -> &WalkableField {
        &world.field
    }

    /// Dimensions of the walkable field.
    #[must_use]
    pub fn dimensions(world: &World) -> FieldDimensions {
        world.field.dimensions()
    }

    /// Number of agents per size state.
    #[must_use]
    pub fn counts(world: &World) -> StateCounts {
        StateCounts::tally(world.agents.iter().map(|agent| agent.state))
    }

    /// Population and spawn parameters of the crowd.
    #[must_use]
    pub fn config(world: &World) -> &CrowdConfig {
        &world.config
    }
}

/// Draws uniformly from `[min, max)`, collapsing empty ranges to `min`.
pub(crate) fn uniform<T, R>(rng: &mut R, min: T, max: T) -> T
where
    T: SampleUniform + PartialOrd + Copy,
    R: Rng + ?Sized,
{
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

fn clamp_axis(value: f32, extent: u32) -> f32 {
    let upper = extent.saturating_sub(1) as f32;
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, upper)
    }
}
