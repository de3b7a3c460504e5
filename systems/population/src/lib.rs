#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Population control system that tops up small agents when large ones dominate.

use crowd_sim_core::{AgentView, Command, Event};

/// Pure system requesting spawns so small agents never stay outnumbered.
#[derive(Debug, Default)]
pub struct Population;

impl Population {
    /// Creates the population system.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Emits a spawn request when the last batch advanced time, large agents
    /// outnumber small ones, and the crowd is below `capacity`.
    pub fn handle(
        &mut self,
        events: &[Event],
        agents: &AgentView,
        capacity: usize,
        out: &mut Vec<Command>,
    ) {
        if !events
            .iter()
            .any(|event| matches!(event, Event::TimeAdvanced { .. }))
        {
            return;
        }

        let counts = agents.counts();
        let deficit = counts.large.saturating_sub(counts.small);
        let spare = capacity.saturating_sub(agents.len());
        let count = deficit.min(spare);
        if count > 0 {
            out.push(Command::SpawnAgents { count });
        }
    }
}
