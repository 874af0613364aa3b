//! Correlation engine error types.
//!
//! Only [`CorrelationError::Timeout`] is expected to cross the requester's
//! public boundary during normal operation. Store and monitor faults are
//! isolated per key / per tick and logged where they happen.

use crate::domain::config::ConfigError;
use crate::domain::key::CorrelationKey;
use crate::ports::outbound::DispatchError;
use thiserror::Error;

/// Errors surfaced by the correlation engine.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// No reply arrived within the configured window.
    #[error("no reply for {key} within {timeout_ms}ms")]
    Timeout {
        key: CorrelationKey,
        timeout_ms: u64,
    },

    /// A second wait was registered for a key that is still in flight.
    #[error("a wait is already registered for correlation key {0}")]
    DuplicateWait(CorrelationKey),

    /// Two replies tried to resolve the same active wait.
    #[error("duplicate result for in-flight request {0}")]
    DuplicateResolution(CorrelationKey),

    /// The gate opened but carried no reply.
    #[error("wait for {0} was released without a reply")]
    MissingResolvedReply(CorrelationKey),

    /// The outgoing request could not be dispatched.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The reply store failed.
    #[error("reply store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// No reply source is attached to deliver through.
    #[error("no reply source attached")]
    NoReplySource,

    /// The monitor needs a tokio runtime and none is running.
    #[error("no tokio runtime available for the correlation monitor")]
    NoRuntime,

    /// The service has been shut down.
    #[error("request/reply service is shut down")]
    ShutDown,
}

impl CorrelationError {
    /// Whether the caller can retry the same request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CorrelationError::Timeout { .. }
                | CorrelationError::Dispatch(_)
                | CorrelationError::Store(_)
        )
    }
}

/// Reply store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No stored reply under this key.
    #[error("no stored reply for {0}")]
    NotFound(CorrelationKey),

    /// Filesystem or backend I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key cannot be represented by this store.
    #[error("correlation key {key} is {len} bytes; this store accepts at most {max}")]
    KeyTooLong {
        key: CorrelationKey,
        len: usize,
        max: usize,
    },

    /// The store was disposed and no longer accepts operations.
    #[error("store has been disposed")]
    Disposed,
}

/// Result alias for engine operations.
pub type CorrelationResult<T> = Result<T, CorrelationError>;
