//! # Shared Bus - Event Bus for Request/Reply Traffic
//!
//! Carries outgoing requests, inbound replies and the diagnostic
//! notifications of the correlation engine.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  RequestDispatched  ┌──────────────┐
//! │  Requester   │ ──────────────────▶ │  Responder   │
//! │              │                     │              │
//! │              │ ◀────────────────── │              │
//! └──────────────┘   ReplyDelivered    └──────────────┘
//!        │
//!        └── ReplyTimedOut / MissedAsyncReply / DuplicateResolution
//!                       (Diagnostics topic)
//! ```
//!
//! Routing happens on publish: each subscription gets its own queue holding
//! only the events its filter selects. A live subscription never loses an
//! event; events that match no subscription are counted and dropped.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{CorrelationEvent, EventFilter, EventSource, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Queued events per subscriber above which the bus reports a slow consumer.
pub const DEFAULT_BACKLOG_WARNING: usize = 1000;
