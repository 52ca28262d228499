//! Locally owned state with change notification.
//!
//! [`StateHolder`] keeps a private [`State`] value and accepts partial
//! updates through [`StateHolder::set_state`]. Every accepted update is
//! deep-merged onto the current state and announced with a `state:changed`
//! event carrying the complete new snapshot.
//!
//! # Example
//!
//! ```rust
//! use statesync::prelude::*;
//! use serde_json::json;
//!
//! let holder = StateHolder::new();
//! assert!(holder.state().is_empty());
//!
//! holder.set_state(PartialState::new().set("a", 1));
//! holder.set_state(PartialState::new().set("b", 2));
//! assert_eq!(serde_json::Value::Object(holder.state()), json!({"a": 1, "b": 2}));
//!
//! holder.set_state(PartialState::new().clear("a"));
//! assert_eq!(serde_json::Value::Object(holder.state()), json!({"b": 2}));
//! ```

use crate::evented::{Emitter, Evented, StateListener};
use parking_lot::{ReentrantMutex, RwLock};
use statesync_core::{merged, InstanceId, PartialState, State, StateChangedEvent, StateEvent};
use std::sync::Arc;

/// Capability of holding a readable state snapshot.
///
/// Both [`StateHolder`] and
/// [`ObservedStateBridge`](crate::observable::ObservedStateBridge) implement
/// it; they differ in how `set_state` reaches the stored value.
pub trait Stateful: Evented {
    /// Identity used as the `target` of emitted events.
    fn instance_id(&self) -> InstanceId;

    /// The current full state snapshot.
    fn state(&self) -> State;
}

/// Construction options for [`StateHolder`].
#[derive(Clone, Default)]
pub struct StatefulOptions {
    /// State to start from instead of `{}`. Installed without emitting.
    pub initial_state: Option<State>,
    /// Listeners attached before the instance is returned.
    pub listeners: Vec<Arc<dyn StateListener>>,
}

impl StatefulOptions {
    /// Start from `state` instead of an empty mapping.
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Attach `listener` at construction.
    #[must_use]
    pub fn with_listener(mut self, listener: impl StateListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }
}

impl std::fmt::Debug for StatefulOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulOptions")
            .field("initial_state", &self.initial_state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// An instance owning its state locally.
///
/// Concurrent `set_state` calls are serialized from store through emit, so
/// events are emitted in the order the snapshots were stored.
#[derive(Debug)]
pub struct StateHolder {
    id: InstanceId,
    state: RwLock<State>,
    // Held across store and emit. Reentrant so listeners may call back in.
    dispatch: ReentrantMutex<()>,
    emitter: Emitter,
}

impl StateHolder {
    /// Create an instance with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StatefulOptions::default())
    }

    /// Create an instance from options.
    #[must_use]
    pub fn with_options(options: StatefulOptions) -> Self {
        let emitter = Emitter::new();
        for listener in options.listeners {
            emitter.on_arc(listener);
        }

        Self {
            id: InstanceId::random(),
            state: RwLock::new(options.initial_state.unwrap_or_default()),
            dispatch: ReentrantMutex::new(()),
            emitter,
        }
    }

    /// Merge `partial` into the state and emit `state:changed`.
    ///
    /// Keys set in `partial` override (objects merge recursively, anything
    /// else is replaced), cleared keys are removed, and all other keys keep
    /// their values. Exactly one event is emitted per call, after the new
    /// state is stored.
    pub fn set_state(&self, partial: impl Into<PartialState>) {
        let partial = partial.into();
        let _dispatch = self.dispatch.lock();
        let state = {
            let mut guard = self.state.write();
            let next = merged(&guard, &partial);
            *guard = next.clone();
            next
        };

        tracing::trace!(instance = %self.id, keys = partial.len(), "state merged");
        self.emitter
            .emit(&StateEvent::from(StateChangedEvent::new(state, self.id)));
    }
}

impl Default for StateHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl Evented for StateHolder {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl Stateful for StateHolder {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn state(&self) -> State {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    fn recorder(holder: &StateHolder) -> Arc<Mutex<Vec<StateEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        holder.on(move |event: &StateEvent| sink.lock().push(event.clone()));
        events
    }

    #[test]
    fn starts_empty() {
        let holder = StateHolder::new();
        assert_eq!(Value::Object(holder.state()), json!({}));
    }

    #[test]
    fn successive_updates_accumulate() {
        let holder = StateHolder::new();
        let events = recorder(&holder);

        holder.set_state(PartialState::new().set("a", 1));
        holder.set_state(PartialState::new().set("b", 2));

        assert_eq!(Value::Object(holder.state()), json!({"a": 1, "b": 2}));
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(Value::Object(events[1].state().clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn clearing_a_key_removes_it() {
        let holder = StateHolder::new();
        holder.set_state(PartialState::new().set("a", 1));
        holder.set_state(PartialState::new().clear("a"));
        assert_eq!(Value::Object(holder.state()), json!({}));
    }

    #[test]
    fn every_update_emits_the_stored_snapshot() {
        let holder = StateHolder::new();
        let events = recorder(&holder);

        for n in 0..5 {
            holder.set_state(PartialState::new().set("n", n));
            let last = events.lock().last().cloned().expect("event emitted");
            assert_eq!(last.state(), &holder.state());
            assert_eq!(last.target(), holder.instance_id());
        }
        assert_eq!(events.lock().len(), 5);
    }

    #[test]
    fn empty_partial_still_emits() {
        let holder = StateHolder::new();
        let events = recorder(&holder);
        holder.set_state(PartialState::new());
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn listener_can_read_state_during_emit() {
        let holder = Arc::new(StateHolder::new());
        let seen = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&holder);
        let sink = Arc::clone(&seen);
        holder.on(move |_: &StateEvent| {
            if let Some(holder) = weak.upgrade() {
                *sink.lock() = Some(holder.state());
            }
        });

        holder.set_state(PartialState::new().set("k", "v"));
        let seen = seen.lock().clone().expect("listener ran");
        assert_eq!(Value::Object(seen), json!({"k": "v"}));
    }

    #[test]
    fn options_seed_state_and_listeners() {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let mut initial = State::new();
        initial.insert("seed".into(), json!(true));

        let holder = StateHolder::with_options(
            StatefulOptions::default()
                .with_state(initial)
                .with_listener(move |_: &StateEvent| *sink.lock() += 1),
        );

        assert_eq!(*count.lock(), 0);
        holder.set_state(PartialState::new().set("more", 1));
        assert_eq!(*count.lock(), 1);
        assert_eq!(Value::Object(holder.state()), json!({"seed": true, "more": 1}));
    }

    #[test]
    fn destroy_drops_listeners() {
        let holder = StateHolder::new();
        let events = recorder(&holder);
        assert!(holder.destroy());
        holder.set_state(PartialState::new().set("a", 1));
        assert!(events.lock().is_empty());
    }
}
