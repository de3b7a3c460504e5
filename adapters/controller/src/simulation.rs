use std::{sync::Arc, time::Duration};

use crowd_sim_core::{AgentSnapshot, Command, CrowdState, Event, StateCounts};
use crowd_sim_system_population::Population;
use crowd_sim_system_size_events::SizeEvents;
use crowd_sim_system_smoothing::Smoothing;
use crowd_sim_world::{self as world, query, WalkableField, World};
use tracing::debug;

use crate::ControllerConfig;

const SCHEDULE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// World, systems and the last published snapshot, guarded by one lock.
#[derive(Debug)]
pub(crate) struct Simulation {
    world: World,
    size_events: SizeEvents,
    population: Population,
    smoothing: Smoothing,
    dt: Duration,
    published: Arc<CrowdState>,
}

impl Simulation {
    pub(crate) fn new(field: Arc<WalkableField>, config: &ControllerConfig) -> Self {
        let world = World::new(field, config.crowd.clone(), config.seed, config.epoch);
        let mut simulation = Self {
            world,
            size_events: SizeEvents::new(config.schedule, config.seed ^ SCHEDULE_SEED_SALT),
            population: Population::new(),
            smoothing: Smoothing::new(config.smoothing_factor),
            dt: config.tick_interval,
            published: Arc::new(CrowdState::default()),
        };
        simulation.publish();
        simulation
    }

    pub(crate) fn published(&self) -> Arc<CrowdState> {
        Arc::clone(&self.published)
    }

    /// Advances time, runs every system in order, and publishes the result.
    pub(crate) fn tick(&mut self) {
        let mut events = Vec::new();
        world::apply(&mut self.world, Command::Tick { dt: self.dt }, &mut events);

        let view = query::agent_view(&self.world);
        self.smoothing.handle(&events, &view);

        let mut commands = Vec::new();
        self.size_events.handle(&events, &view, &mut commands);
        self.execute_all(commands);

        let view = query::agent_view(&self.world);
        let capacity = query::config(&self.world).max_agents;
        let mut commands = Vec::new();
        self.population.handle(&events, &view, capacity, &mut commands);
        self.execute_all(commands);

        self.publish();
    }

    /// Applies an external command and republishes when it was accepted.
    pub(crate) fn execute_external(&mut self, command: Command) -> Vec<Event> {
        let events = self.execute(command);
        let rejected = events
            .iter()
            .any(|event| matches!(event, Event::CommandRejected { .. }));
        if !rejected {
            self.publish();
        }
        events
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            let _ = self.execute(command);
        }
    }

    /// Applies one command and feeds the resulting events back to the systems.
    fn execute(&mut self, command: Command) -> Vec<Event> {
        let mut events = Vec::new();
        world::apply(&mut self.world, command, &mut events);
        if events.is_empty() {
            return events;
        }

        for event in &events {
            if let Event::CommandRejected { agent, reason } = event {
                debug!(agent = agent.get(), ?reason, "command rejected");
            }
        }

        let view = query::agent_view(&self.world);
        self.smoothing.handle(&events, &view);
        let mut follow_up = Vec::new();
        self.size_events.handle(&events, &view, &mut follow_up);
        self.execute_all(follow_up);
        events
    }

    fn publish(&mut self) {
        let people: Vec<AgentSnapshot> = query::agent_view(&self.world)
            .into_vec()
            .into_iter()
            .map(|mut agent| {
                if let Some(position) = self.smoothing.position(agent.id) {
                    agent.position = position;
                }
                agent
            })
            .collect();

        let counts = StateCounts::tally(people.iter().map(|agent| agent.state));
        let tracking = crowd_sim_system_tracking::estimate(&people);
        self.published = Arc::new(CrowdState {
            timestamp: query::clock(&self.world),
            people,
            tracking,
            map: query::dimensions(&self.world),
            counts,
        });
    }
}
