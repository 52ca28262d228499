//! Push-stream subscription handle and its forwarding loop.

use crate::error::StoreError;
use crate::store::StateStream;
use futures::StreamExt;
use statesync_core::State;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// One live subscription to a record's push-stream.
///
/// Cancelling stops the forwarding task, which drops the stream and thereby
/// unsubscribes from the store.
#[derive(Debug)]
pub(crate) struct Subscription {
    id: String,
    token: CancellationToken,
    released: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Returns `false` if already cancelled.
    pub(crate) fn cancel(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!(id = %self.id, "unsubscribing from state stream");
        self.token.cancel();
        true
    }
}

/// Feed `stream` into `on_value` until cancelled, exhausted, or told to stop.
///
/// The first stream error ends the loop after being handed to `on_error`.
/// Cancellation is checked before every item, so nothing is delivered once
/// `token` is cancelled.
pub(crate) async fn forward<F, E>(
    mut stream: StateStream,
    token: CancellationToken,
    mut on_value: F,
    on_error: E,
) where
    F: FnMut(State) -> ControlFlow<()>,
    E: FnOnce(StoreError),
{
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(state)) => {
                    if on_value(state).is_break() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    on_error(err);
                    break;
                }
                None => break,
            },
        }
    }
}
