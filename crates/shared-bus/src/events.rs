//! # Correlation Events
//!
//! Defines every event that flows through the shared bus: outgoing requests,
//! delivered replies, and the diagnostic notifications the correlation engine
//! emits when something goes wrong.

use serde::{Deserialize, Serialize};
use shared_types::Exchange;

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CorrelationEvent {
    // =========================================================================
    // TRANSPORT
    // =========================================================================
    /// A request was dispatched and is waiting for a responder.
    /// Source: Requester | Target: Responders
    RequestDispatched {
        /// The outgoing request, including its reply route.
        exchange: Exchange,
    },

    /// A responder delivered a reply.
    /// Source: Responder | Target: Reply source of the requesting engine
    ReplyDelivered {
        /// The reply exchange.
        exchange: Exchange,
    },

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================
    /// A requester gave up waiting for its reply.
    ReplyTimedOut {
        /// Correlation key of the abandoned wait.
        correlation_key: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A reply arrived for a key that was already matched or timed out.
    MissedAsyncReply {
        /// Correlation key of the stray reply.
        correlation_key: String,
    },

    /// Two replies tried to resolve the same active wait.
    DuplicateResolution {
        /// Correlation key that was resolved twice.
        correlation_key: String,
    },
}

impl CorrelationEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::RequestDispatched { .. } => EventTopic::Requests,
            Self::ReplyDelivered { .. } => EventTopic::Replies,
            Self::ReplyTimedOut { .. }
            | Self::MissedAsyncReply { .. }
            | Self::DuplicateResolution { .. } => EventTopic::Diagnostics,
        }
    }

    /// Get the originating party.
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            Self::RequestDispatched { .. } | Self::ReplyTimedOut { .. } => EventSource::Requester,
            Self::ReplyDelivered { .. } => EventSource::Responder,
            Self::MissedAsyncReply { .. } | Self::DuplicateResolution { .. } => {
                EventSource::Monitor
            }
        }
    }

    /// Correlation id or key this event refers to, for logging.
    #[must_use]
    pub fn correlation(&self) -> &str {
        match self {
            Self::RequestDispatched { exchange } | Self::ReplyDelivered { exchange } => {
                &exchange.correlation_id
            }
            Self::ReplyTimedOut {
                correlation_key, ..
            }
            | Self::MissedAsyncReply { correlation_key }
            | Self::DuplicateResolution { correlation_key } => correlation_key,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Outgoing requests.
    Requests,
    /// Inbound replies.
    Replies,
    /// Timeout / missed reply / duplicate notifications.
    Diagnostics,
    /// All events (no filtering).
    All,
}

/// Which party published an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    Requester,
    Responder,
    Monitor,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Sources to include. Empty means all sources.
    pub sources: Vec<EventSource>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            sources: Vec::new(),
        }
    }

    /// Create a filter for events from specific sources.
    #[must_use]
    pub fn from_sources(sources: Vec<EventSource>) -> Self {
        Self {
            topics: Vec::new(),
            sources,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &CorrelationEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.sources.is_empty() || self.sources.contains(&event.source());

        topic_match && source_match
    }
}
