//! In-process [`StateStore`] backed by a hash map and broadcast channels.

use super::{StateStore, StateStream};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use statesync_core::{merge_into, PatchRecord, State};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Snapshots buffered per record for slow observers. An observer that
    /// falls further behind receives [`StoreError::Lagged`].
    pub channel_capacity: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl MemoryStoreConfig {
    /// Set the per-record broadcast capacity (at least 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug)]
struct MemoryInner {
    config: MemoryStoreConfig,
    records: RwLock<HashMap<String, State>>,
    channels: Mutex<HashMap<String, broadcast::Sender<State>>>,
}

/// Shared in-memory store.
///
/// Clones share the same records. Patches merge with the same deep-merge
/// rules as [`StateHolder`](crate::stateful::StateHolder), then push the new
/// record to every observer of that id. A record's broadcast channel is
/// dropped once its last observer is gone.
///
/// # Example
///
/// ```rust
/// use statesync::store::{MemoryStore, StateStore};
/// use statesync_core::{PartialState, PatchRecord};
/// use serde_json::json;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = MemoryStore::new();
/// store
///     .patch(PatchRecord::new("todo-1", PartialState::new().set("done", false)))
///     .await
///     .unwrap();
///
/// let record = store.get("todo-1").await.unwrap();
/// assert_eq!(serde_json::Value::Object(record), json!({"done": false}));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create an empty store.
    #[must_use]
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                records: RwLock::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replace record `id` wholesale and notify its observers.
    pub fn insert(&self, id: impl Into<String>, state: State) {
        let id = id.into();
        let mut records = self.inner.records.write();
        records.insert(id.clone(), state.clone());
        self.publish(&id, state);
    }

    /// Remove record `id`. Observers are not notified.
    pub fn remove(&self, id: &str) -> Option<State> {
        self.inner.records.write().remove(id)
    }

    /// Current value of record `id`, if any.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<State> {
        self.inner.records.read().get(id).cloned()
    }

    /// Number of live observer streams for record `id`.
    #[must_use]
    pub fn subscriber_count(&self, id: &str) -> usize {
        self.inner
            .channels
            .lock()
            .get(id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    fn sender(&self, id: &str) -> broadcast::Sender<State> {
        let mut channels = self.inner.channels.lock();
        // Channels whose observers are all gone are recreated on demand.
        channels.retain(|_, tx| tx.receiver_count() > 0);
        channels
            .entry(id.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.config.channel_capacity).0)
            .clone()
    }

    // Callers hold the records lock so observers see updates in commit order.
    fn publish(&self, id: &str, state: State) {
        let mut channels = self.inner.channels.lock();
        if let Some(tx) = channels.get(id) {
            if tx.send(state).is_err() {
                channels.remove(id);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn observe(&self, id: &str) -> StateStream {
        tracing::debug!(id, "memory store observer attached");
        BroadcastStream::new(self.sender(id).subscribe())
            .map(|item| {
                item.map_err(|err| match err {
                    BroadcastStreamRecvError::Lagged(skipped) => StoreError::Lagged { skipped },
                })
            })
            .boxed()
    }

    async fn get(&self, id: &str) -> StoreResult<State> {
        self.snapshot(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_owned() })
    }

    async fn patch(&self, record: PatchRecord) -> StoreResult<()> {
        let mut records = self.inner.records.write();
        let state = records.entry(record.id.clone()).or_default();
        merge_into(state, &record.changes);
        let state = state.clone();
        self.publish(&record.id, state);
        Ok(())
    }
}
