//! Reply Correlation - asynchronous request/reply over decoupled channels.
//!
//! A caller sends a request on one channel and blocks until the matching
//! reply arrives on another, a timeout elapses, or the wait is cancelled.
//! The reply may be received by a different task or process than the one
//! waiting for it; the reply store bridges the two.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       RequestReplyService                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  request_reply()                                                     │
//! │    ├─ register wait ──────────▶ ┌──────────────────┐                 │
//! │    ├─ dispatch ───▶ Dispatcher  │   WaitRegistry   │                 │
//! │    └─ wait on gate ◀─ release ─ │ key -> ReplyGate │                 │
//! │                                 └────────▲─────────┘                 │
//! │                                          │ claim + hand off          │
//! │  ┌──────────────┐  store  ┌──────────┐   │   ┌───────────────────┐   │
//! │  │ Ingestion    │ ──────▶ │  Reply   │ ──┴── │ CorrelationMonitor│   │
//! │  │ Endpoint     │ ─nudge─────────────────▶   │ (interval + nudge)│   │
//! │  └──────▲───────┘         │  Store   │       └─────────┬─────────┘   │
//! │         │                 └──────────┘                 │             │
//! │    ReplySource                          RecentlyResolvedTracker      │
//! │                                         (late reply detection)       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one wait per correlation key; a second registration fails.
//! - A gate is released at most once, by whoever claims the wait.
//! - Matched and timed-out are mutually exclusive for a key.
//! - Replies arriving after their key was resolved are discarded with a
//!   `MissedAsyncReply` event.
//! - The recently resolved tracker never exceeds its capacity.
//!
//! # Usage
//!
//! ```ignore
//! use reply_correlation::{BusDispatcher, BusReplySource, RequestReplyService};
//!
//! let bus = Arc::new(InMemoryEventBus::new());
//! let service = RequestReplyService::builder(Arc::new(BusDispatcher::new(bus.clone())))
//!     .config(CorrelationConfig::from_env()?)
//!     .reply_source(Arc::new(BusReplySource::new(bus.clone())))
//!     .build()?;
//!
//! let reply = service.request(&mut request).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ingest;
pub mod monitor;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{
    BusDispatcher, BusReplySource, DirectReplySource, FileReplyStore, InMemoryReplyStore,
    ScopedReplyStore,
};
pub use domain::{
    correlation_id_key_strategy, default_key_strategy, ConfigError, CorrelationConfig,
    CorrelationError, CorrelationKey, CorrelationResult, CorrelationStats, KeyStrategy,
    RecentlyResolvedTracker, ReplyGate, ReplyTimeout, StatsSnapshot, StoreError,
    UnmatchedReplyPolicy, WaitRegistry, DEFAULT_RECENTLY_RESOLVED_CAPACITY,
    DEFAULT_UNCLAIMED_TTL_MS, SEQUENCE_NOT_SET, STORE_PREFIX_SEPARATOR,
};
pub use ingest::ReplyIngestionEndpoint;
pub use monitor::{CorrelationMonitor, MonitorHandle, TickReport};
pub use ports::{
    accept_all, CorrelatePredicate, DispatchError, Dispatcher, ReplySource, ReplyStore,
    RequestReplyApi, StoredReply,
};
pub use service::{RequestReplyService, RequestReplyServiceBuilder};

// Re-export the cancellation signal accepted by `request_reply`
pub use tokio_util::sync::CancellationToken;
