//! Core type library for statesync.
//!
//! Holds the data model shared by every statesync component: the [`State`]
//! mapping, [`PartialState`] updates and their deep-merge rules, the
//! [`PatchRecord`] sent to remote stores, instance identifiers and the
//! `state:changed` event.

pub mod error;
pub mod event;
pub mod state;
pub mod types;

pub use error::{Result, StateSyncError};
pub use event::{EventType, StateChangedEvent, StateEvent};
pub use state::{merge_into, merged, PartialState, PatchRecord, State};
pub use types::ids::InstanceId;

/// Re-export to ensure the same type is used
pub use serde_json::Value as JsonValue;
