//! JSON messages exchanged with live map observers.
//!
//! Every message is an object tagged by a `type` field. Observers receive
//! [`OutboundMessage::State`] broadcasts and send [`InboundMessage`] control
//! requests back.

use serde::{Deserialize, Serialize};

use crate::{AgentId, AgentState, CrowdState, FieldDimensions};

/// Control requests sent by observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Drags an agent to a new position.
    MovePerson {
        /// Identifier of the agent to move.
        id: AgentId,
        /// Requested horizontal coordinate.
        x: f32,
        /// Requested vertical coordinate.
        y: f32,
    },
    /// Sets or flips an agent's size state.
    ToggleState {
        /// Identifier of the agent to toggle.
        id: AgentId,
        /// Optional state label; anything other than `large` or `small` flips.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    /// Discards the crowd and seeds a fresh population.
    ResetMap,
}

impl InboundMessage {
    /// Parses a single JSON message.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Resolves the optional state label of a toggle request.
#[must_use]
pub fn desired_state(label: Option<&str>) -> Option<AgentState> {
    label.and_then(AgentState::from_label)
}

/// Messages broadcast to observers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    /// Full crowd snapshot.
    State(&'a CrowdState),
    /// Field dimensions announced when a session starts.
    MapMeta(FieldDimensions),
}

impl OutboundMessage<'_> {
    /// Encodes the message as a single line of JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
