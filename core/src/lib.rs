#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the crowd simulation engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to. Systems consume event streams, query immutable [`AgentView`]
//! snapshots, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod protocol;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock and steps every agent.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Places an agent at the provided coordinates, bypassing kinematics.
    MoveAgent {
        /// Identifier of the agent being relocated.
        agent: AgentId,
        /// Requested horizontal coordinate in field pixels.
        x: f32,
        /// Requested vertical coordinate in field pixels.
        y: f32,
    },
    /// Sets an agent's size state explicitly, or flips it when no state is given.
    SetAgentState {
        /// Identifier of the agent whose state changes.
        agent: AgentId,
        /// State to apply; `None` flips the current state.
        desired: Option<AgentState>,
    },
    /// Spawns the provided number of new small agents.
    SpawnAgents {
        /// Number of agents to create.
        count: usize,
    },
    /// Discards every agent and seeds a fresh clustered population.
    ResetCrowd,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
        /// Clock reading after the tick completed.
        now: Timestamp,
    },
    /// Confirms that an agent was relocated by an external override.
    AgentMoved {
        /// Identifier of the relocated agent.
        agent: AgentId,
        /// Walkable position the agent now occupies.
        position: Position,
    },
    /// Confirms that an agent transitioned into the large state.
    AgentPromoted {
        /// Identifier of the promoted agent.
        agent: AgentId,
        /// Clock reading recorded as the agent's promotion time.
        at: Timestamp,
    },
    /// Confirms that an agent transitioned into the small state.
    AgentDemoted {
        /// Identifier of the demoted agent.
        agent: AgentId,
        /// Clock reading at which the demotion happened.
        at: Timestamp,
    },
    /// Confirms that a new agent joined the crowd.
    AgentSpawned {
        /// Identifier assigned to the new agent.
        agent: AgentId,
        /// Position the agent occupies after spawning.
        position: Position,
    },
    /// Announces that the crowd was discarded and reseeded.
    CrowdReset {
        /// Clock reading at which the reset happened.
        at: Timestamp,
        /// Number of agents in the fresh population.
        population: usize,
    },
    /// Reports that a command targeting an agent was rejected.
    CommandRejected {
        /// Identifier referenced by the rejected command.
        agent: AgentId,
        /// Specific reason the command failed.
        reason: RejectionReason,
    },
}

/// Reasons an agent-targeted command may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    /// No agent with the provided identifier exists.
    UnknownAgent,
}

/// Unique identifier assigned to an agent.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Binary size mode carried by every agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Default mode for spawned agents.
    #[default]
    Small,
    /// Promoted mode entered by schedule or external command.
    Large,
}

impl AgentState {
    /// Returns the opposite state.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Small => Self::Large,
            Self::Large => Self::Small,
        }
    }

    /// Parses the wire label of a state. Unknown labels yield `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "small" => Some(Self::Small),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    /// Wire label of the state.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Large => "large",
        }
    }

    /// Reports whether the state is [`AgentState::Large`].
    #[must_use]
    pub const fn is_large(self) -> bool {
        matches!(self, Self::Large)
    }
}

/// Point on the simulation clock measured in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Creates a timestamp from a number of seconds.
    #[must_use]
    pub const fn from_secs(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds represented by the timestamp.
    #[must_use]
    pub const fn as_secs(&self) -> f64 {
        self.0
    }

    /// Seconds elapsed between `earlier` and `self`. Negative when `earlier` is later.
    #[must_use]
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }

    /// Returns the timestamp shifted by the provided number of seconds.
    #[must_use]
    pub fn offset_by(self, seconds: f64) -> Self {
        Self(self.0 + seconds)
    }

    /// Returns the timestamp advanced by the provided duration.
    #[must_use]
    pub fn advanced_by(self, dt: Duration) -> Self {
        Self(self.0 + dt.as_secs_f64())
    }
}

/// Continuous position within the field, measured in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two positions.
    #[must_use]
    pub fn distance(self, other: Position) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<PixelCoord> for Position {
    fn from(pixel: PixelCoord) -> Self {
        Self::new(pixel.x() as f32, pixel.y() as f32)
    }
}

/// Location of a single field pixel expressed as column and row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelCoord {
    x: u32,
    y: u32,
}

impl PixelCoord {
    /// Creates a new pixel coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Zero-based column of the pixel.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based row of the pixel.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }
}

/// Width and height of the walkable field in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDimensions {
    /// Number of pixel columns.
    pub width: u32,
    /// Number of pixel rows.
    pub height: u32,
}

impl FieldDimensions {
    /// Creates a new dimension descriptor.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Immutable representation of a single agent's public state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Unique identifier assigned to the agent.
    pub id: AgentId,
    /// Position of the agent.
    #[serde(flatten)]
    pub position: Position,
    /// Size state of the agent.
    pub state: AgentState,
    /// Time of the agent's last promotion, possibly back-dated at spawn.
    #[serde(rename = "last_unshrinked_at")]
    pub last_promoted_at: Timestamp,
}

/// Read-only snapshot describing all agents in the crowd.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentView {
    snapshots: Vec<AgentSnapshot>,
}

impl AgentView {
    /// Creates a new agent view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<AgentSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.snapshots.iter()
    }

    /// Number of agents captured by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view contains no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Looks up the snapshot of a single agent.
    #[must_use]
    pub fn get(&self, agent: AgentId) -> Option<&AgentSnapshot> {
        self.snapshots
            .binary_search_by_key(&agent, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Counts agents per size state.
    #[must_use]
    pub fn counts(&self) -> StateCounts {
        StateCounts::tally(self.snapshots.iter().map(|snapshot| snapshot.state))
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<AgentSnapshot> {
        self.snapshots
    }
}

/// Number of agents in each size state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Agents in the small state.
    pub small: usize,
    /// Agents in the large state.
    pub large: usize,
}

impl StateCounts {
    /// Tallies the provided states.
    #[must_use]
    pub fn tally(states: impl IntoIterator<Item = AgentState>) -> Self {
        states
            .into_iter()
            .fold(Self::default(), |mut counts, state| {
                match state {
                    AgentState::Small => counts.small += 1,
                    AgentState::Large => counts.large += 1,
                }
                counts
            })
    }

    /// Total number of agents.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.small + self.large
    }
}

/// Centroid-and-confidence summary of the crowd's large subgroup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingEstimate {
    /// Horizontal coordinate of the estimate.
    pub x: f32,
    /// Vertical coordinate of the estimate.
    pub y: f32,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Immutable snapshot of the whole crowd published once per tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrowdState {
    /// Clock reading at which the snapshot was assembled.
    pub timestamp: Timestamp,
    /// Public view of every agent, ordered by identifier.
    pub people: Vec<AgentSnapshot>,
    /// Derived tracking estimate.
    #[serde(rename = "fhu")]
    pub tracking: TrackingEstimate,
    /// Dimensions of the walkable field.
    pub map: FieldDimensions,
    /// Number of agents per size state.
    pub counts: StateCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u32, state: AgentState) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            position: Position::new(id as f32, 0.0),
            state,
            last_promoted_at: Timestamp::default(),
        }
    }

    #[test]
    fn agent_view_orders_snapshots_and_counts_states() {
        let view = AgentView::from_snapshots(vec![
            snapshot(3, AgentState::Large),
            snapshot(1, AgentState::Small),
            snapshot(2, AgentState::Small),
        ]);

        let ids: Vec<u32> = view.iter().map(|agent| agent.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(view.counts(), StateCounts { small: 2, large: 1 });
        assert_eq!(
            view.get(AgentId::new(3)).map(|agent| agent.state),
            Some(AgentState::Large)
        );
        assert!(view.get(AgentId::new(9)).is_none());
    }

    #[test]
    fn state_labels_parse_and_toggle() {
        assert_eq!(AgentState::from_label("large"), Some(AgentState::Large));
        assert_eq!(AgentState::from_label("small"), Some(AgentState::Small));
        assert_eq!(AgentState::from_label("huge"), None);
        assert_eq!(AgentState::Small.toggled(), AgentState::Large);
        assert_eq!(AgentState::Large.label(), "large");
    }

    #[test]
    fn timestamps_measure_elapsed_seconds() {
        let start = Timestamp::from_secs(100.0);
        let later = start.advanced_by(Duration::from_millis(1_500));
        assert!((later.seconds_since(start) - 1.5).abs() < 1e-9);
        assert!(start.offset_by(-301.0).seconds_since(start) < -300.0);
    }

    #[test]
    fn agent_snapshot_serializes_with_wire_field_names() {
        let value = serde_json::to_value(snapshot(4, AgentState::Large)).expect("serialize");
        assert_eq!(value["id"], 4);
        assert_eq!(value["x"], 4.0);
        assert_eq!(value["state"], "large");
        assert!(value.get("last_unshrinked_at").is_some());
        assert!(value.get("position").is_none());
    }
}
