//! Stateful components with change notification and store synchronization.
//!
//! This crate provides two layered capabilities for component-like objects:
//!
//! 1. **[`StateHolder`]** - owns a private key-value state, accepts partial
//!    updates and emits `state:changed` after each one
//! 2. **[`ObservedStateBridge`]** - keeps the same event contract but mirrors
//!    a record of a remote [`StateStore`]: local edits are sent to the store
//!    as patches and remote pushes are reflected back
//!
//! Both emit the same event shape,
//! `{ "type": "state:changed", "state": {..}, "target": ".." }`, always
//! carrying a complete snapshot.
//!
//! # Quick Start
//!
//! ```rust
//! use statesync::prelude::*;
//! use serde_json::json;
//!
//! let holder = StateHolder::new();
//! holder.on(|event: &StateEvent| {
//!     println!("now {}", serde_json::Value::Object(event.state().clone()));
//! });
//!
//! holder.set_state(PartialState::new().set("count", 1));
//! assert_eq!(holder.state().get("count"), Some(&json!(1)));
//! ```
//!
//! # Observing a store
//!
//! ```rust
//! use statesync::prelude::*;
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let store = MemoryStore::new();
//! store.insert("counter", State::new());
//!
//! let counter = ObservedStateBridge::new(ObservableProperties::new(
//!     "counter",
//!     Arc::new(store.clone()),
//! ));
//! counter.observe().expect("id and store are set");
//! counter.set_state(PartialState::new().set("count", 1)).await.unwrap();
//!
//! counter.destroy();
//! # });
//! ```
//!
//! # Error Handling
//!
//! Synchronous misuse (`observe()` without configuration, or for a different
//! id) is returned directly. Failures of asynchronous work nobody awaits, a
//! push-stream error or the initial fetch, are delivered to the instance's
//! error listeners. See the [`error`] module.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod evented;
pub mod observable;
pub mod stateful;
pub mod store;

pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use evented::{Emitter, ErrorListener, Evented, Handle, ListenerHandle, StateListener};
pub use observable::{
    Observable, ObservableOptions, ObservableProperties, ObservedStateBridge, PropertyDiffing,
};
pub use stateful::{StateHolder, Stateful, StatefulOptions};
pub use store::{MemoryStore, MemoryStoreConfig, StateStore, StateStream};

// Re-export the entire statesync-core crate for full access
pub use statesync_core;

pub use statesync_core::{
    InstanceId, PartialState, PatchRecord, State, StateChangedEvent, StateEvent,
};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use statesync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{StoreError, SyncError, SyncResult};
    pub use crate::evented::{Evented, StateListener};
    pub use crate::observable::{
        Observable, ObservableOptions, ObservableProperties, ObservedStateBridge, PropertyDiffing,
    };
    pub use crate::stateful::{StateHolder, Stateful, StatefulOptions};
    pub use crate::store::{MemoryStore, StateStore};

    pub use statesync_core::{InstanceId, PartialState, State, StateChangedEvent, StateEvent};
}

#[cfg(test)]
mod tests {
    #[test]
    fn prelude_imports_work() {
        use crate::prelude::*;

        fn _assert_observable<T: Observable + PropertyDiffing>() {}
        fn _assert_store<S: StateStore>(_: S) {}
        _assert_observable::<ObservedStateBridge>();
        _assert_store(MemoryStore::new());
    }
}
