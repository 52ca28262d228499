//! Error types for state synchronization.
//!
//! Two layers:
//!
//! - [`StoreError`] is what a [`StateStore`](crate::store::StateStore)
//!   implementation reports for a failed `observe`, `get` or `patch`.
//! - [`SyncError`] is what the stateful components report to their callers or
//!   to the instance error channel. Remote failures wrap the originating
//!   [`StoreError`] as their source.
//!
//! Nothing in this crate retries. Every remote operation is attempted once and
//! its failure is surfaced as-is.
//!
//! # Example
//!
//! ```rust
//! use statesync::error::{StoreError, SyncError};
//!
//! fn describe(err: &SyncError) -> &'static str {
//!     match err {
//!         SyncError::InvalidConfiguration { .. } => "set `id` and `state_from` first",
//!         SyncError::IdentityConflict { .. } => "tear down before re-pointing",
//!         err if err.is_remote() => "remote store failure",
//!         _ => "other",
//!     }
//! }
//!
//! let err = SyncError::RemoteFetchFailure {
//!     id: "todo-1".into(),
//!     source: StoreError::NotFound { id: "todo-1".into() },
//! };
//! assert_eq!(describe(&err), "remote store failure");
//! ```

use thiserror::Error;

/// Errors from state synchronization.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    /// Observation was requested without both an `id` and a `state_from` store.
    #[error("both id and state_from are required to observe state (missing {missing})")]
    InvalidConfiguration {
        /// The property that was absent or empty.
        missing: &'static str,
    },

    /// Observation was requested for a different id while a subscription is
    /// live. The existing subscription is left untouched.
    #[error("unable to observe state for '{requested}' while observing '{observing}'")]
    IdentityConflict {
        /// Id of the live subscription.
        observing: String,
        /// Id the caller asked for.
        requested: String,
    },

    /// The push-stream for an observed id reported an error.
    #[error("state stream for '{id}' failed: {source}")]
    RemoteStreamFailure {
        /// Observed record id.
        id: String,
        /// Error reported by the store.
        #[source]
        source: StoreError,
    },

    /// The store rejected a patch.
    #[error("patching '{id}' failed: {source}")]
    RemotePatchFailure {
        /// Patched record id.
        id: String,
        /// Error reported by the store.
        #[source]
        source: StoreError,
    },

    /// The store failed to return the current value of a record.
    #[error("fetching '{id}' failed: {source}")]
    RemoteFetchFailure {
        /// Fetched record id.
        id: String,
        /// Error reported by the store.
        #[source]
        source: StoreError,
    },

    /// Subscriptions run as tokio tasks and need an ambient runtime.
    #[error("observing state requires a running tokio runtime")]
    MissingRuntime,
}

impl SyncError {
    /// Check if this error came from the remote store.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteStreamFailure { .. }
                | Self::RemotePatchFailure { .. }
                | Self::RemoteFetchFailure { .. }
        )
    }

    /// Check if this error is a synchronous misuse of `observe()`.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::IdentityConflict { .. } | Self::MissingRuntime
        )
    }

    /// The record id involved, when there is one.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::IdentityConflict { requested, .. } => Some(requested),
            Self::RemoteStreamFailure { id, .. }
            | Self::RemotePatchFailure { id, .. }
            | Self::RemoteFetchFailure { id, .. } => Some(id),
            Self::InvalidConfiguration { .. } | Self::MissingRuntime => None,
        }
    }
}

/// Errors reported by a remote state store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// No record exists for the id.
    #[error("record '{id}' not found")]
    NotFound {
        /// The missing record id.
        id: String,
    },

    /// The store's push channel dropped updates for a slow subscriber.
    #[error("subscriber lagged behind by {skipped} updates")]
    Lagged {
        /// Number of updates that were skipped.
        skipped: u64,
    },

    /// Connection or transport-level failure.
    #[error("transport error: {reason}")]
    Transport {
        /// Reason for the failure.
        reason: String,
    },

    /// Custom error from a store implementation.
    #[error("{message}")]
    Custom {
        /// Error message.
        message: String,
        /// Optional source error for chaining.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Create a custom error with a message.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            source: None,
        }
    }

    /// Create a custom error with a message and source.
    #[must_use]
    pub fn custom_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
