#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Exponential smoothing of agent positions for presentation.
//!
//! The authoritative positions in the world stay untouched; this system only
//! remembers a smoothed copy per agent that snapshots publish instead.

use std::collections::HashMap;

use crowd_sim_core::{AgentId, AgentView, Event, Position};

/// Fraction of the remaining distance covered on every tick.
pub const DEFAULT_FACTOR: f32 = 0.22;

/// Per-agent exponential moving average of positions.
#[derive(Debug)]
pub struct Smoothing {
    factor: f32,
    memory: HashMap<AgentId, Position>,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::new(DEFAULT_FACTOR)
    }
}

impl Smoothing {
    /// Creates an empty memory blending with the provided factor, clamped to `[0, 1]`.
    #[must_use]
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            memory: HashMap::new(),
        }
    }

    /// Updates the memory from a batch of world events.
    ///
    /// Spawned and moved agents jump straight to their new position, a reset
    /// forgets everything, and a tick blends every agent towards its raw
    /// position. Agents missing from the view are dropped.
    pub fn handle(&mut self, events: &[Event], agents: &AgentView) {
        let mut ticked = false;
        for event in events {
            match event {
                Event::CrowdReset { .. } => self.memory.clear(),
                Event::AgentSpawned { agent, position } | Event::AgentMoved { agent, position } => {
                    let _ = self.memory.insert(*agent, *position);
                }
                Event::TimeAdvanced { .. } => ticked = true,
                _ => {}
            }
        }

        if !ticked {
            return;
        }

        let factor = self.factor;
        let mut next = HashMap::with_capacity(agents.len());
        for agent in agents.iter() {
            let raw = agent.position;
            let smoothed = match self.memory.get(&agent.id) {
                Some(previous) => Position::new(
                    previous.x + factor * (raw.x - previous.x),
                    previous.y + factor * (raw.y - previous.y),
                ),
                None => raw,
            };
            let _ = next.insert(agent.id, smoothed);
        }
        self.memory = next;
    }

    /// Smoothed position of the agent, if it has been observed.
    #[must_use]
    pub fn position(&self, agent: AgentId) -> Option<Position> {
        self.memory.get(&agent).copied()
    }

    /// Reports whether the agent has a smoothed position.
    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.memory.contains_key(&agent)
    }

    /// Number of agents remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Reports whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
