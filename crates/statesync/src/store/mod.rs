//! Remote state store abstraction.
//!
//! An [`ObservedStateBridge`](crate::observable::ObservedStateBridge) mirrors
//! one record of a [`StateStore`]. The store is an opaque capability: the
//! bridge only needs a push-stream of snapshots, a one-shot read, and a way
//! to submit partial updates.
//!
//! [`MemoryStore`] is an in-process implementation suitable for tests and
//! for sharing state between components of the same process.

mod memory;

pub use memory::{MemoryStore, MemoryStoreConfig};

use crate::error::StoreResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use statesync_core::{PatchRecord, State};

/// Stream of snapshots pushed by a store for one record.
pub type StateStream = BoxStream<'static, StoreResult<State>>;

/// A key-value store whose records can be observed, read and patched.
///
/// # Contract
///
/// - [`observe`](StateStore::observe) returns a new, independent stream per
///   call. Dropping the stream unsubscribes.
/// - [`get`](StateStore::get) resolves once with the current snapshot.
/// - [`patch`](StateStore::patch) resolves once the update is accepted.
///
/// None of these operations are retried or timed out by callers in this
/// crate.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Subscribe to snapshots of record `id`.
    fn observe(&self, id: &str) -> StateStream;

    /// Read the current snapshot of record `id`.
    async fn get(&self, id: &str) -> StoreResult<State>;

    /// Apply a partial update to the record named by `record.id`.
    async fn patch(&self, record: PatchRecord) -> StoreResult<()>;
}
