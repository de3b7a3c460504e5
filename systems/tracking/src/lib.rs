#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tracking estimate summarising where the large agents gather.

use crowd_sim_core::{AgentSnapshot, TrackingEstimate};

/// Confidence reported when no agent is large and the whole crowd is averaged.
pub const FALLBACK_CONFIDENCE: f32 = 0.1;

/// Centroid of the large agents with the large share of the crowd as confidence.
///
/// Without large agents the centroid of everyone is reported with a low fixed
/// confidence. An empty crowd yields the origin with zero confidence.
#[must_use]
pub fn estimate(people: &[AgentSnapshot]) -> TrackingEstimate {
    if people.is_empty() {
        return TrackingEstimate::default();
    }

    let large: Vec<&AgentSnapshot> = people
        .iter()
        .filter(|agent| agent.state.is_large())
        .collect();
    if large.is_empty() {
        let (x, y) = centroid(people.iter());
        return TrackingEstimate {
            x,
            y,
            confidence: FALLBACK_CONFIDENCE,
        };
    }

    let (x, y) = centroid(large.iter().copied());
    TrackingEstimate {
        x,
        y,
        confidence: (large.len() as f64 / people.len() as f64) as f32,
    }
}

fn centroid<'a>(agents: impl ExactSizeIterator<Item = &'a AgentSnapshot>) -> (f32, f32) {
    let count = agents.len() as f64;
    let (sum_x, sum_y) = agents.fold((0.0, 0.0), |(x, y), agent| {
        (x + f64::from(agent.position.x), y + f64::from(agent.position.y))
    });
    ((sum_x / count) as f32, (sum_y / count) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_sim_core::{AgentId, AgentState, Position, Timestamp};

    fn agent(id: u32, x: f32, y: f32, state: AgentState) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            position: Position::new(x, y),
            state,
            last_promoted_at: Timestamp::default(),
        }
    }

    #[test]
    fn large_agents_drive_the_estimate() {
        let people = [
            agent(0, 10.0, 10.0, AgentState::Large),
            agent(1, 30.0, 50.0, AgentState::Large),
            agent(2, 500.0, 500.0, AgentState::Small),
            agent(3, 700.0, 100.0, AgentState::Small),
        ];

        let estimate = estimate(&people);
        assert_eq!((estimate.x, estimate.y), (20.0, 30.0));
        assert!((estimate.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn small_only_crowd_uses_everyone_with_low_confidence() {
        let people = [
            agent(0, 0.0, 0.0, AgentState::Small),
            agent(1, 9.0, 3.0, AgentState::Small),
        ];

        let estimate = estimate(&people);
        assert_eq!((estimate.x, estimate.y), (4.5, 1.5));
        assert!((estimate.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_crowd_reports_origin_without_confidence() {
        assert_eq!(estimate(&[]), TrackingEstimate::default());
    }
}
