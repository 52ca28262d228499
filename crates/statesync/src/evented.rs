//! Synchronous event emission and owned-resource teardown.
//!
//! Every stateful instance carries an [`Emitter`]. It dispatches
//! [`StateEvent`]s to registered [`StateListener`]s on the calling thread,
//! routes asynchronous failures to [`ErrorListener`]s, and owns resources
//! (such as remote subscriptions) that must be released when the instance is
//! destroyed.
//!
//! # Example
//!
//! ```rust
//! use statesync::evented::Emitter;
//! use statesync_core::{InstanceId, State, StateChangedEvent, StateEvent};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let emitter = Emitter::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! let handle = emitter.on(move |_: &StateEvent| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! let event = StateEvent::from(StateChangedEvent::new(State::new(), InstanceId::random()));
//! emitter.emit(&event);
//! handle.remove();
//! emitter.emit(&event);
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use crate::error::SyncError;
use parking_lot::Mutex;
use statesync_core::{StateChangedEvent, StateEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A resource released when its owner is destroyed.
pub trait Handle: Send + Sync {
    /// Release the resource. Implementations must tolerate repeated calls.
    fn destroy(&self);

    /// Check if the resource was already released by other means. Released
    /// handles are dropped by the owning [`Emitter`] without being destroyed
    /// again.
    fn is_released(&self) -> bool {
        false
    }
}

/// Wrap a closure as a [`Handle`].
pub fn handle_fn<F>(f: F) -> Box<dyn Handle>
where
    F: Fn() + Send + Sync + 'static,
{
    Box::new(FnHandle(f))
}

struct FnHandle<F>(F);

impl<F> Handle for FnHandle<F>
where
    F: Fn() + Send + Sync,
{
    fn destroy(&self) {
        (self.0)();
    }
}

/// Receives events emitted by a stateful instance.
///
/// Closures taking `&StateEvent` implement this trait directly.
pub trait StateListener: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: &StateEvent) {
        match event {
            StateEvent::StateChanged(e) => self.on_state_changed(e),
        }
    }

    /// Called for every `state:changed` event.
    fn on_state_changed(&self, event: &StateChangedEvent) {
        let _ = event;
    }
}

impl<F> StateListener for F
where
    F: Fn(&StateEvent) + Send + Sync,
{
    fn on_event(&self, event: &StateEvent) {
        self(event);
    }
}

/// Receives errors raised outside any caller's reach, such as a failing
/// push-stream or initial fetch.
pub trait ErrorListener: Send + Sync {
    /// Called once per error.
    fn on_error(&self, error: &SyncError);
}

impl<F> ErrorListener for F
where
    F: Fn(&SyncError) + Send + Sync,
{
    fn on_error(&self, error: &SyncError) {
        self(error);
    }
}

type Listeners = Vec<(u64, Arc<dyn StateListener>)>;
type ErrorListeners = Vec<(u64, Arc<dyn ErrorListener>)>;

#[derive(Default)]
struct EmitterInner {
    listeners: Mutex<Listeners>,
    error_listeners: Mutex<ErrorListeners>,
    owned: Mutex<Vec<Box<dyn Handle>>>,
    next_key: AtomicU64,
    destroyed: AtomicBool,
}

impl EmitterInner {
    fn remove(&self, key: u64) {
        self.listeners.lock().retain(|(k, _)| *k != key);
        self.error_listeners.lock().retain(|(k, _)| *k != key);
    }
}

/// Listener registry and owned-resource list for one instance.
#[derive(Default)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    /// Create an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event listener.
    pub fn on<L>(&self, listener: L) -> ListenerHandle
    where
        L: StateListener + 'static,
    {
        self.on_arc(Arc::new(listener))
    }

    /// Register a shared event listener.
    pub fn on_arc(&self, listener: Arc<dyn StateListener>) -> ListenerHandle {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((key, listener));
        self.handle(key)
    }

    /// Register an error listener.
    pub fn on_error<L>(&self, listener: L) -> ListenerHandle
    where
        L: ErrorListener + 'static,
    {
        let listener: Arc<dyn ErrorListener> = Arc::new(listener);
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        self.inner.error_listeners.lock().push((key, listener));
        self.handle(key)
    }

    fn handle(&self, key: u64) -> ListenerHandle {
        ListenerHandle {
            emitter: Arc::downgrade(&self.inner),
            key,
        }
    }

    /// Dispatch `event` to every listener registered at the time of the call.
    ///
    /// Listeners run synchronously, in registration order. The registry lock
    /// is not held while they run, so a listener may register or remove
    /// listeners and may read the emitting instance's state.
    pub fn emit(&self, event: &StateEvent) {
        let listeners: Vec<_> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener.on_event(event);
        }
    }

    /// Deliver `error` to the error listeners.
    ///
    /// With no error listener registered the error is logged through
    /// `tracing` at error level and then dropped: nothing else observes it,
    /// and it is not replayed to listeners registered later.
    pub fn emit_error(&self, error: &SyncError) {
        let listeners: Vec<_> = self
            .inner
            .error_listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        if listeners.is_empty() {
            tracing::error!(%error, "unhandled state sync error");
            return;
        }

        for listener in listeners {
            listener.on_error(error);
        }
    }

    /// Take ownership of a resource released by [`Emitter::destroy`].
    ///
    /// Previously owned handles that report [`Handle::is_released`] are
    /// dropped first. On an already destroyed emitter the resource is
    /// released immediately.
    pub fn own(&self, handle: Box<dyn Handle>) {
        if self.is_destroyed() {
            handle.destroy();
            return;
        }
        let mut owned = self.inner.owned.lock();
        owned.retain(|h| !h.is_released());
        owned.push(handle);
    }

    /// Release every owned resource and drop all listeners.
    ///
    /// Returns `false` if the emitter was already destroyed.
    pub fn destroy(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let owned = std::mem::take(&mut *self.inner.owned.lock());
        for handle in owned {
            handle.destroy();
        }

        self.inner.listeners.lock().clear();
        self.inner.error_listeners.lock().clear();
        true
    }

    /// Check if [`Emitter::destroy`] has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Number of registered event listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Number of owned resources awaiting release.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.inner.owned.lock().len()
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .field("owned", &self.owned_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Registration token returned by [`Emitter::on`] and [`Emitter::on_error`].
///
/// Dropping the handle keeps the listener registered; call
/// [`ListenerHandle::remove`] to unregister it.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    emitter: Weak<EmitterInner>,
    key: u64,
}

impl ListenerHandle {
    /// Unregister the listener. Safe to call more than once.
    pub fn remove(&self) {
        if let Some(inner) = self.emitter.upgrade() {
            inner.remove(self.key);
        }
    }
}

impl Handle for ListenerHandle {
    fn destroy(&self) {
        self.remove();
    }
}

/// Capability of emitting events and owning resources.
///
/// Implementors only provide [`Evented::emitter`].
pub trait Evented {
    /// The instance's emitter.
    fn emitter(&self) -> &Emitter;

    /// Register an event listener on this instance.
    fn on<L>(&self, listener: L) -> ListenerHandle
    where
        L: StateListener + 'static,
        Self: Sized,
    {
        self.emitter().on(listener)
    }

    /// Register an error listener on this instance.
    fn on_error<L>(&self, listener: L) -> ListenerHandle
    where
        L: ErrorListener + 'static,
        Self: Sized,
    {
        self.emitter().on_error(listener)
    }

    /// Emit an event to this instance's listeners.
    fn emit(&self, event: &StateEvent) {
        self.emitter().emit(event);
    }

    /// Hand a resource to this instance for release on destruction.
    fn own(&self, handle: Box<dyn Handle>) {
        self.emitter().own(handle);
    }

    /// Destroy the instance: release owned resources and drop listeners.
    fn destroy(&self) -> bool {
        self.emitter().destroy()
    }
}
