use crate::state::State;
use crate::types::ids::InstanceId;
use serde::{Deserialize, Serialize};

/// Event types emitted by stateful instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "state:changed")]
    StateChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StateChanged => "state:changed",
        }
    }
}

/// Emitted after every accepted state mutation.
///
/// `state` is always the complete snapshot stored on the instance after the
/// change, never the partial update that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub state: State,
    pub target: InstanceId,
}

impl StateChangedEvent {
    pub fn new(state: State, target: InstanceId) -> Self {
        Self { state, target }
    }
}

/// Union of all events a stateful instance emits.
///
/// Serializes with an internal `type` tag, so a state change is
/// `{ "type": "state:changed", "state": {..}, "target": ".." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateEvent {
    #[serde(rename = "state:changed")]
    StateChanged(StateChangedEvent),
}

impl StateEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            StateEvent::StateChanged(_) => EventType::StateChanged,
        }
    }

    pub fn target(&self) -> InstanceId {
        match self {
            StateEvent::StateChanged(e) => e.target,
        }
    }

    /// The snapshot carried by a state change.
    pub fn state(&self) -> &State {
        match self {
            StateEvent::StateChanged(e) => &e.state,
        }
    }
}

impl From<StateChangedEvent> for StateEvent {
    fn from(event: StateChangedEvent) -> Self {
        StateEvent::StateChanged(event)
    }
}
