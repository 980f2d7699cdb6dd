//! Watch engine errors
//!
//! Startup errors (input validation, kind resolution, stream registration,
//! backfill timeout) are fatal and returned to the caller. Per-event errors
//! (malformed notifications, malformed keys) are isolated to that event.

use input_resources::InputResourceError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the watch engine.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Input resource set failed validation
    #[error("Invalid input resources: {0}")]
    InvalidInput(#[from] InputResourceError),

    /// Kubernetes API error (discovery, client construction)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The resolver has no watchable kind for an identifier
    #[error("Unknown resource kind {kind}: {reason}")]
    UnknownKind {
        /// Rendered resource kind identifier
        kind: String,
        /// Why resolution failed
        reason: String,
    },

    /// Resolving a selector's kind failed during registration
    #[error("Unable to find kind for {selector}, for {owner} owner: {reason}")]
    KindResolution {
        /// Owner that declared the selector
        owner: String,
        /// Rendered selector
        selector: String,
        /// Resolver error message
        reason: String,
    },

    /// Creating the watch stream for a kind failed
    #[error("Failed to register watch stream for {kind}: {reason}")]
    StreamRegistration {
        /// Kind the stream was requested for
        kind: String,
        /// Provider error message
        reason: String,
    },

    /// Transient error reported by a running watch stream
    #[error("Watch stream error: {0}")]
    Stream(String),

    /// A watch stream ended before reporting its cache hydrated
    #[error("Watch stream for {0} closed before its cache synced")]
    StreamClosed(String),

    /// Notification carried neither a live object nor a usable tombstone
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A work-queue key could not be decoded
    #[error("Malformed key {key:?}: {reason}")]
    MalformedKey {
        /// The offending key
        key: String,
        /// What part of the format was violated
        reason: String,
    },

    /// Initial backfill did not complete in time
    #[error("Caches did not sync within {0:?}")]
    SyncTimeout(Duration),

    /// The sync gate was dropped or cancelled before the caches synced
    #[error("Cache sync aborted before completion")]
    SyncAborted,

    /// The surrounding context was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl WatchError {
    /// Build a `MalformedKey` error
    pub(crate) fn malformed_key(key: &str, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
