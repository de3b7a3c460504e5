//! Single-agent state and kinematics against the walkable field.

use std::f32::consts::TAU;

use crowd_sim_core::{AgentId, AgentSnapshot, AgentState, Position, Timestamp};
use glam::Vec2;
use rand::Rng;

use crate::{field::WalkableField, uniform};

/// Ranges from which per-agent motion constants are drawn at spawn.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentTuning {
    /// Slowest travel speed in pixels per second.
    pub speed_min: f32,
    /// Fastest travel speed in pixels per second.
    pub speed_max: f32,
    /// Smallest heading jitter in radians per second.
    pub turn_rate_min: f32,
    /// Largest heading jitter in radians per second.
    pub turn_rate_max: f32,
    /// Random headings tried after a blocked step before snapping.
    pub escape_attempts: u32,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            speed_min: 18.0,
            speed_max: 32.0,
            turn_rate_min: 0.6,
            turn_rate_max: 1.4,
            escape_attempts: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Agent {
    pub(crate) id: AgentId,
    pub(crate) position: Position,
    heading: f32,
    speed: f32,
    turn_rate: f32,
    pub(crate) state: AgentState,
    pub(crate) last_promoted_at: Timestamp,
}

impl Agent {
    pub(crate) fn spawn<R>(
        id: AgentId,
        position: Position,
        last_promoted_at: Timestamp,
        tuning: &AgentTuning,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            id,
            position,
            heading: rng.gen_range(0.0..TAU),
            speed: uniform(rng, tuning.speed_min, tuning.speed_max),
            turn_rate: uniform(rng, tuning.turn_rate_min, tuning.turn_rate_max),
            state: AgentState::Small,
            last_promoted_at,
        }
    }

    /// Advances the agent by `dt` seconds.
    ///
    /// The heading performs a bounded random walk. A blocked step retries with
    /// fresh random headings and finally snaps onto the field, so the agent is
    /// always walkable when this returns.
    pub(crate) fn step<R>(
        &mut self,
        field: &WalkableField,
        dt: f32,
        escape_attempts: u32,
        rng: &mut R,
    ) where
        R: Rng + ?Sized,
    {
        self.heading += uniform(rng, -self.turn_rate, self.turn_rate) * dt;
        let travel = self.speed * dt;

        let proposed = advance(self.position, self.heading, travel);
        if field.is_walkable(proposed) {
            self.position = proposed;
            return;
        }

        for _ in 0..escape_attempts {
            let heading = rng.gen_range(0.0..TAU);
            let proposed = advance(self.position, heading, travel);
            if field.is_walkable(proposed) {
                self.heading = heading;
                self.position = proposed;
                return;
            }
        }

        self.position = field.snap_to_walkable(self.position, rng);
    }

    pub(crate) fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            position: self.position,
            state: self.state,
            last_promoted_at: self.last_promoted_at,
        }
    }
}

fn advance(position: Position, heading: f32, distance: f32) -> Position {
    let moved = Vec2::new(position.x, position.y) + Vec2::from_angle(heading) * distance;
    Position::new(moved.x, moved.y)
}
