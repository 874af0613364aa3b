//! # Event Publisher
//!
//! Publish-side routing. Every subscription registers a route (its filter
//! plus a queue); `publish` hands the event only to routes whose filter
//! matches, so a reply subscriber never buffers request or diagnostic
//! traffic.

use crate::events::{CorrelationEvent, EventFilter};
use crate::subscriber::{Backlog, EventStream, EventSubscriber, Subscription};
use crate::DEFAULT_BACKLOG_WARNING;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Notification and transport sink.
///
/// The correlation engine publishes its diagnostics through this trait;
/// bus transports publish requests and replies.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event; returns the number of subscriptions it was queued for.
    async fn publish(&self, event: CorrelationEvent) -> usize;

    /// Total events published, delivered or not.
    fn events_published(&self) -> u64;
}

/// Publish-side half of a subscription.
struct Route {
    id: u64,
    filter: EventFilter,
    sender: mpsc::UnboundedSender<CorrelationEvent>,
    backlog: Arc<Backlog>,
}

/// In-process bus with per-subscriber queues.
///
/// Delivery to a live subscription never drops an event. A single process
/// only; cross-host deployments put a broker behind [`EventPublisher`].
pub struct InMemoryEventBus {
    routes: RwLock<Vec<Route>>,
    next_route: AtomicU64,
    events_published: AtomicU64,
    events_unrouted: AtomicU64,
    backlog_warnings: AtomicU64,
    backlog_warning: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_backlog_warning(DEFAULT_BACKLOG_WARNING)
    }

    /// Bus that warns when a subscriber has more than `threshold` events
    /// queued.
    #[must_use]
    pub fn with_backlog_warning(threshold: usize) -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            next_route: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            events_unrouted: AtomicU64::new(0),
            backlog_warnings: AtomicU64::new(0),
            backlog_warning: threshold.max(1),
        }
    }

    /// Register a route for `filter`. Events published after this call are
    /// queued for the returned subscription.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let backlog = Arc::new(Backlog::default());
        let id = self.next_route.fetch_add(1, Ordering::Relaxed);

        let mut routes = self.routes.write();
        routes.retain(|route| !route.sender.is_closed());
        routes.push(Route {
            id,
            filter: filter.clone(),
            sender,
            backlog: backlog.clone(),
        });
        debug!(subscription = id, topics = ?filter.topics, "Subscription registered");

        Subscription::new(id, receiver, filter, backlog)
    }

    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.subscribe(filter))
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.routes
            .read()
            .iter()
            .filter(|route| !route.sender.is_closed())
            .count()
    }

    /// Events that matched no live subscription.
    #[must_use]
    pub fn events_unrouted(&self) -> u64 {
        self.events_unrouted.load(Ordering::Relaxed)
    }

    /// Times a subscriber crossed the backlog threshold.
    #[must_use]
    pub fn backlog_warnings(&self) -> u64 {
        self.backlog_warnings.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn backlog_warning(&self) -> usize {
        self.backlog_warning
    }

    /// Queue `event` on `route`. Returns false when the subscription is gone.
    fn enqueue(&self, route: &Route, event: CorrelationEvent) -> bool {
        let depth = route.backlog.push();
        if route.sender.send(event).is_err() {
            route.backlog.revert();
            return false;
        }

        if depth > self.backlog_warning && route.backlog.flag_once() {
            self.backlog_warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                subscription = route.id,
                topics = ?route.filter.topics,
                queued = depth,
                threshold = self.backlog_warning,
                "Subscriber is falling behind; events are queueing"
            );
        }
        true
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        InMemoryEventBus::subscribe(self, filter)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: CorrelationEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();

        let mut delivered = 0;
        let mut closed = false;
        {
            let routes = self.routes.read();
            for route in routes.iter().filter(|route| route.filter.matches(&event)) {
                if self.enqueue(route, event.clone()) {
                    delivered += 1;
                } else {
                    closed = true;
                }
            }
        }

        if closed {
            self.routes.write().retain(|route| !route.sender.is_closed());
        }

        if delivered == 0 {
            self.events_unrouted.fetch_add(1, Ordering::Relaxed);
            debug!(
                topic = ?topic,
                correlation = %event.correlation(),
                "Event matched no subscription"
            );
        } else {
            trace!(topic = ?topic, receivers = delivered, "Event published");
        }
        delivered
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
