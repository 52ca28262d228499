#![allow(dead_code)]

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use statesync::prelude::*;
use statesync::{StateStream, StoreResult};
use statesync_core::{merge_into, PatchRecord};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub fn obj(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Route crate logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run until `cond` holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Give spawned tasks a few turns.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Records every event emitted by an instance.
pub fn record_events(instance: &impl Evented) -> Arc<Mutex<Vec<StateEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    instance
        .emitter()
        .on(move |event: &StateEvent| sink.lock().push(event.clone()));
    events
}

/// Records the message of every error delivered to an instance's error
/// channel.
pub fn record_errors(instance: &impl Evented) -> Arc<Mutex<Vec<String>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    instance
        .emitter()
        .on_error(move |err: &SyncError| sink.lock().push(err.to_string()));
    errors
}

/// Stream wrapper counting how often it is dropped.
struct TrackedStream {
    inner: UnboundedReceiverStream<StoreResult<State>>,
    dropped: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = StoreResult<State>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Scripted {
    records: Mutex<HashMap<String, State>>,
    observers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<StoreResult<State>>>>>,
    observe_calls: Mutex<Vec<String>>,
    get_calls: Mutex<Vec<String>>,
    patches: Mutex<Vec<PatchRecord>>,
    pending_gets: Mutex<VecDeque<oneshot::Sender<StoreResult<State>>>>,
    hold_gets: AtomicBool,
    fail_patches: AtomicBool,
    fail_gets: AtomicBool,
    unsubscribed: Arc<AtomicUsize>,
}

/// A store driven by the test: it records every call, pushes only when told
/// to, and can hold `get` requests until the test releases them.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    inner: Arc<Scripted>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn StateStore> {
        Arc::new(self.clone())
    }

    pub fn with_record(self, id: &str, state: Value) -> Self {
        self.inner.records.lock().insert(id.to_string(), obj(state));
        self
    }

    /// Queue `get` requests instead of answering them.
    pub fn hold_gets(&self) {
        self.inner.hold_gets.store(true, Ordering::SeqCst);
    }

    pub fn fail_patches(&self) {
        self.inner.fail_patches.store(true, Ordering::SeqCst);
    }

    pub fn fail_gets(&self) {
        self.inner.fail_gets.store(true, Ordering::SeqCst);
    }

    pub fn pending_gets(&self) -> usize {
        self.inner.pending_gets.lock().len()
    }

    /// Answer the oldest held `get`.
    pub fn release_get(&self, state: Value) {
        let tx = self
            .inner
            .pending_gets
            .lock()
            .pop_front()
            .expect("a held get");
        let _ = tx.send(Ok(obj(state)));
    }

    pub fn push(&self, id: &str, state: Value) {
        let state = obj(state);
        for tx in self.inner.observers.lock().get(id).into_iter().flatten() {
            let _ = tx.send(Ok(state.clone()));
        }
    }

    pub fn push_error(&self, id: &str, message: &str) {
        for tx in self.inner.observers.lock().get(id).into_iter().flatten() {
            let _ = tx.send(Err(StoreError::custom(message)));
        }
    }

    pub fn observe_calls(&self) -> Vec<String> {
        self.inner.observe_calls.lock().clone()
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.inner.get_calls.lock().clone()
    }

    pub fn patches(&self) -> Vec<PatchRecord> {
        self.inner.patches.lock().clone()
    }

    pub fn unsubscribed(&self) -> usize {
        self.inner.unsubscribed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for ScriptedStore {
    fn observe(&self, id: &str) -> StateStream {
        self.inner.observe_calls.lock().push(id.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .observers
            .lock()
            .entry(id.to_string())
            .or_default()
            .push(tx);
        TrackedStream {
            inner: UnboundedReceiverStream::new(rx),
            dropped: Arc::clone(&self.inner.unsubscribed),
        }
        .boxed()
    }

    async fn get(&self, id: &str) -> StoreResult<State> {
        self.inner.get_calls.lock().push(id.to_string());

        if self.inner.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Transport {
                reason: "get refused".into(),
            });
        }

        if self.inner.hold_gets.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            self.inner.pending_gets.lock().push_back(tx);
            return rx.await.unwrap_or_else(|_| {
                Err(StoreError::Transport {
                    reason: "get abandoned".into(),
                })
            });
        }

        self.inner
            .records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn patch(&self, record: PatchRecord) -> StoreResult<()> {
        self.inner.patches.lock().push(record.clone());

        if self.inner.fail_patches.load(Ordering::SeqCst) {
            return Err(StoreError::Transport {
                reason: "patch refused".into(),
            });
        }

        let mut records = self.inner.records.lock();
        merge_into(records.entry(record.id.clone()).or_default(), &record.changes);
        Ok(())
    }
}
