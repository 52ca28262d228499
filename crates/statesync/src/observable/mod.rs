//! State mirrored from a remote store record.
//!
//! [`ObservedStateBridge`] keeps the `state:changed` contract of
//! [`StateHolder`](crate::stateful::StateHolder) but does not own its state:
//! the value shown locally is whatever the remote record last reported.
//!
//! # Lifecycle
//!
//! ```text
//!              observe()                    destroy() / id or store change
//! Unobserved ─────────────▶ Observing(id) ─────────────────────────────────▶ Unobserved
//!                              │  ▲
//!                              └──┘ observe() with the same id: no-op
//!                                   observe() with another id: IdentityConflict
//! ```
//!
//! # Ordering
//!
//! Snapshots are applied in arrival order. The initial fetch, the push-stream
//! and the fetch that follows a local `set_state` are not sequenced against
//! each other, so an older snapshot arriving late overwrites a newer one.
//! Fetches already in flight when a subscription is torn down still apply
//! their result.

mod bridge;
mod subscription;

pub use bridge::ObservedStateBridge;

use crate::error::SyncResult;
use crate::evented::StateListener;
use crate::stateful::Stateful;
use crate::store::StateStore;
use std::sync::Arc;

/// Capability of mirroring a remote record.
pub trait Observable: Stateful {
    /// Establish, or confirm, the subscription for the configured id.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfiguration`](crate::error::SyncError::InvalidConfiguration)
    ///   if `id` or `state_from` is missing.
    /// - [`SyncError::IdentityConflict`](crate::error::SyncError::IdentityConflict)
    ///   if already observing a different id.
    /// - [`SyncError::MissingRuntime`](crate::error::SyncError::MissingRuntime)
    ///   outside a tokio runtime.
    fn observe(&self) -> SyncResult<()>;

    /// Check if a subscription is live.
    fn is_observing(&self) -> bool;
}

/// Hooks driven by a property-diffing lifecycle.
///
/// After new properties are assigned the driver calls
/// [`diff_properties`](PropertyDiffing::diff_properties) with the previous
/// values, then [`apply_changed_properties`](PropertyDiffing::apply_changed_properties)
/// once the change batch is applied.
pub trait PropertyDiffing {
    /// Property set the instance is configured with.
    type Properties;

    /// React to a property assignment and return the keys to compare on the
    /// next change detection pass.
    fn diff_properties(&self, previous: &Self::Properties) -> Vec<&'static str>;

    /// Re-establish whatever the new properties require.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn apply_changed_properties(&self) -> SyncResult<()>;
}

/// The properties an [`ObservedStateBridge`] is configured with.
#[derive(Clone, Default)]
pub struct ObservableProperties {
    /// Record id to mirror.
    pub id: Option<String>,
    /// Store holding the record.
    pub state_from: Option<Arc<dyn StateStore>>,
}

impl ObservableProperties {
    /// Property keys reported to the diffing lifecycle.
    pub const KEYS: [&'static str; 2] = ["id", "state_from"];

    /// Properties for record `id` of `store`.
    pub fn new(id: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        Self {
            id: Some(id.into()),
            state_from: Some(store),
        }
    }

    /// Set the record id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_from = Some(store);
        self
    }

    /// Check if both properties point at the same store instance.
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        match (&self.state_from, &other.state_from) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Stores compare by identity.
impl PartialEq for ObservableProperties {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.same_store(other)
    }
}

impl std::fmt::Debug for ObservableProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableProperties")
            .field("id", &self.id)
            .field("state_from", &self.state_from.as_ref().map(|_| "StateStore"))
            .finish()
    }
}

/// Construction options for [`ObservedStateBridge`].
#[derive(Clone, Default)]
pub struct ObservableOptions {
    /// Initial properties.
    pub properties: ObservableProperties,
    /// Listeners attached before the instance is returned.
    pub listeners: Vec<Arc<dyn StateListener>>,
}

impl ObservableOptions {
    /// Options with the given properties.
    #[must_use]
    pub fn new(properties: ObservableProperties) -> Self {
        Self {
            properties,
            listeners: Vec::new(),
        }
    }

    /// Attach `listener` at construction.
    #[must_use]
    pub fn with_listener(mut self, listener: impl StateListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }
}

impl std::fmt::Debug for ObservableOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableOptions")
            .field("properties", &self.properties)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
