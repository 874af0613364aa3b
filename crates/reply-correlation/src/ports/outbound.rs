//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the correlation engine is wired to by its host:
//! the transport that sends requests, the source that delivers replies,
//! and the store that carries replies across execution contexts.

use crate::domain::error::StoreError;
use crate::domain::key::CorrelationKey;
use crate::ingest::ReplyIngestionEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::Exchange;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Snapshot of a reply held in a [`ReplyStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReply {
    pub key: CorrelationKey,
    pub exchange: Exchange,
    /// Unix time in milliseconds when the reply was stored
    pub stored_at_ms: u64,
}

impl StoredReply {
    pub fn new(key: CorrelationKey, exchange: Exchange) -> Self {
        Self {
            key,
            exchange,
            stored_at_ms: unix_millis(),
        }
    }

    /// Wall-clock time since the reply was stored. Zero if the writer's
    /// clock is ahead of ours.
    pub fn age(&self) -> Duration {
        Duration::from_millis(unix_millis().saturating_sub(self.stored_at_ms))
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Key/value store bridging reply delivery and the correlation monitor.
///
/// Production: `FileReplyStore` (survives the writer's process)
/// Testing: `InMemoryReplyStore`
///
/// Implementations must tolerate concurrent callers. Storing under an
/// existing key replaces the previous snapshot.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    /// Store a reply snapshot under its key.
    async fn store(&self, reply: StoredReply) -> Result<(), StoreError>;

    /// Read the snapshot for `key`, or [`StoreError::NotFound`].
    async fn retrieve(&self, key: &CorrelationKey) -> Result<StoredReply, StoreError>;

    /// Delete the snapshot for `key`. Deleting a missing key succeeds.
    async fn remove(&self, key: &CorrelationKey) -> Result<(), StoreError>;

    /// All keys currently stored.
    async fn list_keys(&self) -> Result<Vec<CorrelationKey>, StoreError>;

    /// Release backend resources. Called once on service shutdown.
    async fn dispose(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Errors raised while dispatching a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The transport is closed.
    #[error("transport channel closed")]
    ChannelClosed,

    /// The transport refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Transport that sends the outgoing request.
///
/// A synchronous transport may return the reply directly. That value is
/// only used when the request is not correlated.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: Exchange) -> Result<Option<Exchange>, DispatchError>;
}

/// Inbound listener wired to the engine's ingestion endpoint.
///
/// Without an attached reply source the engine runs in pass-through mode.
pub trait ReplySource: Send + Sync {
    /// Start forwarding replies to `endpoint`.
    fn attach(&self, endpoint: ReplyIngestionEndpoint);

    /// Stop forwarding replies.
    fn detach(&self) {}
}

/// Decides whether a request waits for an asynchronous reply.
pub type CorrelatePredicate = Arc<dyn Fn(&Exchange) -> bool + Send + Sync>;

/// Predicate correlating every request.
pub fn accept_all() -> CorrelatePredicate {
    Arc::new(|_: &Exchange| true)
}
