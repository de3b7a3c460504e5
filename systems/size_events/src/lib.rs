#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Size-event scheduling system that promotes and demotes agents over time.
//!
//! Three rules run on every tick. An agent that stayed small for longer than
//! the configured limit is promoted unconditionally. Otherwise a random small
//! agent is promoted once the promotion timer expires. Independently, a random
//! large agent is demoted once the shrink timer expires. Timers are redrawn
//! whenever a promotion or demotion is observed, whatever its origin.

use std::time::Duration;

use crowd_sim_core::{AgentId, AgentSnapshot, AgentState, AgentView, Command, Event, Timestamp};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Timing parameters of the size-event schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Longest time an agent may stay small before it is promoted unconditionally.
    pub max_unshrink: Duration,
    /// Shortest delay before the next random promotion.
    pub promotion_min: Duration,
    /// Longest delay before the next random promotion.
    pub promotion_max: Duration,
    /// Shortest delay before the next random demotion.
    pub shrink_min: Duration,
    /// Longest delay before the next random demotion.
    pub shrink_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_unshrink: Duration::from_secs(300),
            promotion_min: Duration::from_secs(6),
            promotion_max: Duration::from_secs(14),
            shrink_min: Duration::from_secs(8),
            shrink_max: Duration::from_secs(20),
        }
    }
}

/// Pure system emitting state changes according to the size-event schedule.
#[derive(Debug)]
pub struct SizeEvents {
    config: Config,
    rng: ChaCha8Rng,
    next_promotion_at: Option<Timestamp>,
    next_shrink_at: Option<Timestamp>,
}

impl SizeEvents {
    /// Creates the system with its own deterministic random source.
    #[must_use]
    pub fn new(config: Config, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_promotion_at: None,
            next_shrink_at: None,
        }
    }

    /// Time at which the next random promotion is due, once scheduled.
    #[must_use]
    pub fn next_promotion_at(&self) -> Option<Timestamp> {
        self.next_promotion_at
    }

    /// Time at which the next random demotion is due, once scheduled.
    #[must_use]
    pub fn next_shrink_at(&self) -> Option<Timestamp> {
        self.next_shrink_at
    }

    /// Consumes world events and the agent view to emit state change commands.
    ///
    /// Promotions and demotions are only decided for batches that advanced
    /// the clock; other batches merely update the timers.
    pub fn handle(&mut self, events: &[Event], agents: &AgentView, out: &mut Vec<Command>) {
        let mut advanced_to = None;
        for event in events {
            match event {
                Event::TimeAdvanced { now, .. } => advanced_to = Some(*now),
                Event::AgentPromoted { at, .. } => self.schedule_promotion(*at),
                Event::AgentDemoted { at, .. } => self.schedule_shrink(*at),
                Event::CrowdReset { at, .. } => {
                    self.schedule_promotion(*at);
                    self.schedule_shrink(*at);
                }
                _ => {}
            }
        }

        let Some(now) = advanced_to else {
            return;
        };
        let promotion_due = self.promotion_due(now);
        let shrink_due = self.shrink_due(now);

        let max_unshrink = self.config.max_unshrink.as_secs_f64();
        let overdue = self.pick(agents, |agent| {
            agent.state == AgentState::Small
                && now.seconds_since(agent.last_promoted_at) >= max_unshrink
        });
        if let Some(agent) = overdue {
            out.push(set_state(agent, AgentState::Large));
        } else if promotion_due {
            match self.pick(agents, |agent| agent.state == AgentState::Small) {
                Some(agent) => out.push(set_state(agent, AgentState::Large)),
                None => self.schedule_promotion(now),
            }
        }

        if shrink_due {
            match self.pick(agents, |agent| agent.state == AgentState::Large) {
                Some(agent) => out.push(set_state(agent, AgentState::Small)),
                None => self.schedule_shrink(now),
            }
        }
    }

    fn promotion_due(&mut self, now: Timestamp) -> bool {
        let due = match self.next_promotion_at {
            Some(due) => due,
            None => {
                self.schedule_promotion(now);
                return false;
            }
        };
        now >= due
    }

    fn shrink_due(&mut self, now: Timestamp) -> bool {
        let due = match self.next_shrink_at {
            Some(due) => due,
            None => {
                self.schedule_shrink(now);
                return false;
            }
        };
        now >= due
    }

    fn schedule_promotion(&mut self, from: Timestamp) {
        let delay = draw(&mut self.rng, self.config.promotion_min, self.config.promotion_max);
        self.next_promotion_at = Some(from.advanced_by(delay));
    }

    fn schedule_shrink(&mut self, from: Timestamp) {
        let delay = draw(&mut self.rng, self.config.shrink_min, self.config.shrink_max);
        self.next_shrink_at = Some(from.advanced_by(delay));
    }

    fn pick(
        &mut self,
        agents: &AgentView,
        eligible: impl Fn(&AgentSnapshot) -> bool,
    ) -> Option<AgentId> {
        let candidates: Vec<AgentId> = agents
            .iter()
            .filter(|agent| eligible(agent))
            .map(|agent| agent.id)
            .collect();
        candidates.choose(&mut self.rng).copied()
    }
}

fn draw(rng: &mut ChaCha8Rng, min: Duration, max: Duration) -> Duration {
    if max > min {
        Duration::from_secs_f64(rng.gen_range(min.as_secs_f64()..max.as_secs_f64()))
    } else {
        min
    }
}

fn set_state(agent: AgentId, desired: AgentState) -> Command {
    Command::SetAgentState {
        agent,
        desired: Some(desired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_sim_core::Position;

    fn snapshot(id: u32, state: AgentState, last_promoted_at: f64) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            position: Position::default(),
            state,
            last_promoted_at: Timestamp::from_secs(last_promoted_at),
        }
    }

    fn tick(now: f64) -> Event {
        Event::TimeAdvanced {
            dt: Duration::from_millis(100),
            now: Timestamp::from_secs(now),
        }
    }

    #[test]
    fn first_tick_only_initializes_timers() {
        let mut system = SizeEvents::new(Config::default(), 1);
        let view = AgentView::from_snapshots(vec![snapshot(0, AgentState::Small, 95.0)]);
        let mut commands = Vec::new();

        system.handle(&[tick(100.0)], &view, &mut commands);

        assert!(commands.is_empty());
        let promotion = system.next_promotion_at().expect("promotion timer").as_secs();
        let shrink = system.next_shrink_at().expect("shrink timer").as_secs();
        assert!((106.0..114.0).contains(&promotion), "promotion at {promotion}");
        assert!((108.0..120.0).contains(&shrink), "shrink at {shrink}");
    }

    #[test]
    fn batches_without_time_never_emit() {
        let mut system = SizeEvents::new(Config::default(), 2);
        let view = AgentView::from_snapshots(vec![snapshot(0, AgentState::Small, 0.0)]);
        let mut commands = Vec::new();

        system.handle(
            &[Event::AgentMoved {
                agent: AgentId::new(0),
                position: Position::new(1.0, 1.0),
            }],
            &view,
            &mut commands,
        );

        assert!(commands.is_empty());
        assert_eq!(system.next_promotion_at(), None);
    }

    #[test]
    fn observed_promotion_reschedules_from_its_time() {
        let mut system = SizeEvents::new(Config::default(), 3);
        let view = AgentView::default();
        let mut commands = Vec::new();
        system.handle(&[tick(10.0)], &view, &mut commands);

        system.handle(
            &[Event::AgentPromoted {
                agent: AgentId::new(4),
                at: Timestamp::from_secs(50.0),
            }],
            &view,
            &mut commands,
        );

        let promotion = system.next_promotion_at().expect("timer").as_secs();
        assert!((56.0..64.0).contains(&promotion));
    }

    #[test]
    fn due_demotion_without_large_agents_only_reschedules() {
        let mut system = SizeEvents::new(Config::default(), 4);
        let view = AgentView::from_snapshots(vec![snapshot(0, AgentState::Small, 0.0)]);
        let mut commands = Vec::new();
        system.handle(&[tick(0.0)], &view, &mut commands);

        system.handle(&[tick(21.0)], &view, &mut commands);

        let demotions = commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    Command::SetAgentState {
                        desired: Some(AgentState::Small),
                        ..
                    }
                )
            })
            .count();
        assert_eq!(demotions, 0);
        let shrink = system.next_shrink_at().expect("timer").as_secs();
        assert!((29.0..41.0).contains(&shrink), "shrink at {shrink}");
    }

    #[test]
    fn forced_promotion_suppresses_random_promotion() {
        let config = Config::default();
        let mut system = SizeEvents::new(config, 5);
        let view = AgentView::from_snapshots(vec![
            snapshot(0, AgentState::Small, 650.0),
            snapshot(1, AgentState::Small, 100.0),
        ]);
        let mut commands = Vec::new();
        system.handle(&[tick(400.0)], &view, &mut commands);
        assert_eq!(commands, vec![set_state(AgentId::new(1), AgentState::Large)]);

        commands.clear();
        system.handle(&[tick(700.0)], &view, &mut commands);
        assert_eq!(commands, vec![set_state(AgentId::new(1), AgentState::Large)]);
    }
}
