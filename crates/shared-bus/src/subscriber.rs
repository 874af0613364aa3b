//! # Event Subscriber
//!
//! Each subscription owns an unbounded queue fed by the bus. Nothing is
//! dropped while the subscription is alive: a consumer that falls behind
//! grows its backlog (and is reported once it crosses the bus threshold)
//! instead of losing replies.

use crate::events::{CorrelationEvent, EventFilter};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was dropped and the queue is drained.
    #[error("Event bus closed")]
    Closed,
}

/// Anything a transport can subscribe to.
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}

/// Queue depth shared between the bus route and its subscription.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    queued: AtomicUsize,
    flagged: AtomicBool,
}

impl Backlog {
    /// Count one enqueued event and return the new depth.
    pub(crate) fn push(&self) -> usize {
        self.queued.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Undo a `push` whose send failed.
    pub(crate) fn revert(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }

    fn pop(&self) {
        if self.queued.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.flagged.store(false, Ordering::Release);
        }
    }

    /// True exactly once per excursion above the threshold.
    pub(crate) fn flag_once(&self) -> bool {
        !self.flagged.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn depth(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

/// Receiving end of one bus subscription.
///
/// Dropping it closes the queue; the bus prunes the route on its next
/// publish.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<CorrelationEvent>,
    filter: EventFilter,
    backlog: Arc<Backlog>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        receiver: mpsc::UnboundedReceiver<CorrelationEvent>,
        filter: EventFilter,
        backlog: Arc<Backlog>,
    ) -> Self {
        Self {
            id,
            receiver,
            filter,
            backlog,
        }
    }

    /// Next event routed to this subscription; `None` once the bus is
    /// dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<CorrelationEvent> {
        let event = self.receiver.recv().await?;
        self.backlog.pop();
        Some(event)
    }

    /// Non-blocking receive. `Ok(None)` means the queue is currently empty.
    pub fn try_recv(&mut self) -> Result<Option<CorrelationEvent>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(event) => {
                self.backlog.pop();
                Ok(Some(event))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<CorrelationEvent>> {
        let polled = self.receiver.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.backlog.pop();
        }
        polled
    }

    /// Events delivered to this subscription and not yet received.
    pub fn queued(&self) -> usize {
        self.backlog.depth()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// [`Subscription`] as a `Stream`. Ends when the bus is dropped.
#[derive(Debug)]
pub struct EventStream {
    subscription: Subscription,
}

impl EventStream {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    pub fn filter(&self) -> &EventFilter {
        self.subscription.filter()
    }

    pub fn queued(&self) -> usize {
        self.subscription.queued()
    }
}

impl Stream for EventStream {
    type Item = CorrelationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().subscription.poll_event(cx)
    }
}
