//! [`ObservedStateBridge`] implementation.

use super::subscription::{forward, Subscription};
use super::{Observable, ObservableOptions, ObservableProperties, PropertyDiffing};
use crate::error::{SyncError, SyncResult};
use crate::evented::{Emitter, Evented, Handle};
use crate::stateful::Stateful;
use crate::store::StateStore;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use statesync_core::{InstanceId, PartialState, PatchRecord, State, StateChangedEvent, StateEvent};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

/// A component whose state mirrors one record of a [`StateStore`].
///
/// Cloning yields another handle to the same instance. Dropping the last
/// handle, like [`Evented::destroy`], tears down any live subscription.
///
/// # Example
///
/// ```rust
/// use statesync::prelude::*;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = MemoryStore::new();
/// store.insert("todo-1", State::new());
///
/// let todo = ObservedStateBridge::new(ObservableProperties::new(
///     "todo-1",
///     Arc::new(store.clone()),
/// ));
/// todo.observe().expect("configured");
///
/// todo.set_state(PartialState::new().set("done", true)).await.unwrap();
/// assert_eq!(serde_json::Value::Object(todo.state()), json!({"done": true}));
/// # });
/// ```
#[derive(Clone)]
pub struct ObservedStateBridge {
    inner: Arc<BridgeInner>,
}

struct ObservedRecord {
    id: String,
    subscription: Arc<Subscription>,
}

struct BridgeInner {
    id: InstanceId,
    emitter: Emitter,
    properties: RwLock<ObservableProperties>,
    state: RwLock<State>,
    // Held across store and emit so snapshots from concurrent tasks are
    // emitted in the order they were stored.
    dispatch: ReentrantMutex<()>,
    observed: Mutex<Option<ObservedRecord>>,
}

impl BridgeInner {
    fn configured(&self) -> SyncResult<(String, Arc<dyn StateStore>)> {
        let properties = self.properties.read();
        let id = properties
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(SyncError::InvalidConfiguration { missing: "id" })?;
        let store = properties
            .state_from
            .clone()
            .ok_or(SyncError::InvalidConfiguration {
                missing: "state_from",
            })?;
        Ok((id, store))
    }

    /// Store `state` as the current snapshot and announce it.
    fn replace_state(&self, state: State) {
        let _dispatch = self.dispatch.lock();
        *self.state.write() = state.clone();
        tracing::trace!(instance = %self.id, "observed state replaced");
        self.emitter
            .emit(&StateEvent::from(StateChangedEvent::new(state, self.id)));
    }

    /// Tear down whatever subscription is live.
    fn teardown(&self) -> Option<String> {
        let record = self.observed.lock().take()?;
        record.subscription.cancel();
        Some(record.id)
    }

    /// Tear down `subscription`, clearing the record only if it still
    /// refers to it.
    fn release(&self, subscription: &Arc<Subscription>) {
        {
            let mut observed = self.observed.lock();
            if observed
                .as_ref()
                .is_some_and(|record| Arc::ptr_eq(&record.subscription, subscription))
            {
                *observed = None;
            }
        }
        if subscription.cancel() {
            tracing::debug!(instance = %self.id, id = subscription.id(), "subscription released by owner");
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(record) = self.observed.get_mut().take() {
            record.subscription.cancel();
        }
    }
}

/// Teardown registered with the instance's emitter by `observe()`.
struct SubscriptionTeardown {
    bridge: Weak<BridgeInner>,
    subscription: Arc<Subscription>,
}

impl Handle for SubscriptionTeardown {
    fn destroy(&self) {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.release(&self.subscription),
            None => {
                self.subscription.cancel();
            }
        }
    }

    fn is_released(&self) -> bool {
        self.subscription.is_cancelled()
    }
}

impl ObservedStateBridge {
    /// Create an unobserved instance with the given properties.
    #[must_use]
    pub fn new(properties: ObservableProperties) -> Self {
        Self::with_options(ObservableOptions::new(properties))
    }

    /// Create an unobserved instance from options.
    #[must_use]
    pub fn with_options(options: ObservableOptions) -> Self {
        let emitter = Emitter::new();
        for listener in options.listeners {
            emitter.on_arc(listener);
        }

        Self {
            inner: Arc::new(BridgeInner {
                id: InstanceId::random(),
                emitter,
                properties: RwLock::new(options.properties),
                state: RwLock::new(State::new()),
                dispatch: ReentrantMutex::new(()),
                observed: Mutex::new(None),
            }),
        }
    }

    /// The configured properties.
    #[must_use]
    pub fn properties(&self) -> ObservableProperties {
        self.inner.properties.read().clone()
    }

    /// Id of the live subscription, if any.
    #[must_use]
    pub fn observed_id(&self) -> Option<String> {
        self.inner
            .observed
            .lock()
            .as_ref()
            .map(|record| record.id.clone())
    }

    /// Assign new properties without running the diffing lifecycle.
    ///
    /// Returns the previous properties, to be handed to
    /// [`PropertyDiffing::diff_properties`] by whoever drives the lifecycle.
    pub fn assign_properties(&self, properties: ObservableProperties) -> ObservableProperties {
        std::mem::replace(&mut *self.inner.properties.write(), properties)
    }

    /// Assign new properties and run the diffing lifecycle: tear down the
    /// subscription if the identity changed, then observe again.
    ///
    /// Returns the property keys reported by [`PropertyDiffing::diff_properties`].
    ///
    /// # Errors
    ///
    /// Any error from [`Observable::observe`] for the new properties.
    pub fn set_properties(&self, properties: ObservableProperties) -> SyncResult<Vec<&'static str>> {
        let previous = self.assign_properties(properties);
        let keys = self.diff_properties(&previous);
        self.apply_changed_properties()?;
        Ok(keys)
    }

    /// Forward a partial update to the store, then adopt the store's value.
    ///
    /// Nothing is merged locally: `state()` is unchanged until the follow-up
    /// read resolves, and a failed attempt changes nothing and emits nothing.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfiguration`] if `id` or `state_from` is missing.
    /// - [`SyncError::RemotePatchFailure`] if the store rejects the patch.
    /// - [`SyncError::RemoteFetchFailure`] if the follow-up read fails.
    pub async fn set_state(&self, partial: PartialState) -> SyncResult<()> {
        let (id, store) = self.inner.configured()?;

        store
            .patch(PatchRecord::new(id.clone(), partial))
            .await
            .map_err(|source| SyncError::RemotePatchFailure {
                id: id.clone(),
                source,
            })?;

        let fetched = store.get(&id).await;
        let state = fetched.map_err(|source| SyncError::RemoteFetchFailure { id, source })?;

        self.inner.replace_state(state);
        Ok(())
    }
}

impl Evented for ObservedStateBridge {
    fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }
}

impl Stateful for ObservedStateBridge {
    fn instance_id(&self) -> InstanceId {
        self.inner.id
    }

    fn state(&self) -> State {
        self.inner.state.read().clone()
    }
}

impl Observable for ObservedStateBridge {
    fn observe(&self) -> SyncResult<()> {
        let (id, store) = self.inner.configured()?;

        // Taken before `observed`, the same order as a listener calling back
        // in from `replace_state`.
        let _dispatch = self.inner.dispatch.lock();
        let mut observed = self.inner.observed.lock();
        if let Some(record) = observed.as_ref() {
            if record.id == id {
                return Ok(());
            }
            return Err(SyncError::IdentityConflict {
                observing: record.id.clone(),
                requested: id,
            });
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SyncError::MissingRuntime)?;

        *self.inner.state.write() = State::new();
        let subscription = Arc::new(Subscription::new(id.clone()));

        let bridge = Arc::downgrade(&self.inner);
        let errors = Arc::downgrade(&self.inner);
        let stream_id = id.clone();
        runtime.spawn(forward(
            store.observe(&id),
            subscription.token(),
            move |state| match bridge.upgrade() {
                Some(bridge) => {
                    bridge.replace_state(state);
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
            move |source| {
                if let Some(bridge) = errors.upgrade() {
                    bridge.emitter.emit_error(&SyncError::RemoteStreamFailure {
                        id: stream_id,
                        source,
                    });
                }
            },
        ));

        // Not tied to the subscription: the result is applied even after
        // teardown.
        let bridge = Arc::clone(&self.inner);
        let fetch_id = id.clone();
        runtime.spawn(async move {
            let fetched = store.get(&fetch_id).await;
            match fetched {
                Ok(state) => bridge.replace_state(state),
                Err(source) => bridge.emitter.emit_error(&SyncError::RemoteFetchFailure {
                    id: fetch_id,
                    source,
                }),
            }
        });

        *observed = Some(ObservedRecord {
            id: id.clone(),
            subscription: Arc::clone(&subscription),
        });
        drop(observed);

        tracing::debug!(instance = %self.inner.id, %id, "observing state");
        self.inner.emitter.own(Box::new(SubscriptionTeardown {
            bridge: Arc::downgrade(&self.inner),
            subscription,
        }));
        Ok(())
    }

    fn is_observing(&self) -> bool {
        self.inner.observed.lock().is_some()
    }
}

impl PropertyDiffing for ObservedStateBridge {
    type Properties = ObservableProperties;

    fn diff_properties(&self, previous: &ObservableProperties) -> Vec<&'static str> {
        let identity_changed = {
            let current = self.inner.properties.read();
            current.id != previous.id || !current.same_store(previous)
        };

        if identity_changed {
            if let Some(id) = self.inner.teardown() {
                tracing::debug!(instance = %self.inner.id, %id, "identity changed, subscription torn down");
            }
        }

        ObservableProperties::KEYS.to_vec()
    }

    fn apply_changed_properties(&self) -> SyncResult<()> {
        self.observe()
    }
}

impl std::fmt::Debug for ObservedStateBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedStateBridge")
            .field("id", &self.inner.id)
            .field("properties", &*self.inner.properties.read())
            .field("observed_id", &self.observed_id())
            .field("state", &*self.inner.state.read())
            .finish()
    }
}
