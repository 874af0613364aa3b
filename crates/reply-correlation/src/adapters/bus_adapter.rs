//! Event bus adapters.
//!
//! Wires the correlation engine to the shared bus: requests go out as
//! `RequestDispatched` events and `ReplyDelivered` events are fed to the
//! ingestion endpoint.

use crate::ingest::ReplyIngestionEndpoint;
use crate::ports::outbound::{DispatchError, Dispatcher, ReplySource};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use shared_bus::{CorrelationEvent, EventFilter, EventPublisher, EventTopic, InMemoryEventBus};
use shared_types::Exchange;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dispatcher publishing requests to the event bus.
pub struct BusDispatcher {
    bus: Arc<InMemoryEventBus>,
    require_subscriber: bool,
}

impl BusDispatcher {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            require_subscriber: false,
        }
    }

    /// Fail the dispatch when no responder is subscribed, instead of only
    /// logging a warning.
    pub fn require_subscriber(mut self, require: bool) -> Self {
        self.require_subscriber = require;
        self
    }
}

#[async_trait]
impl Dispatcher for BusDispatcher {
    async fn dispatch(&self, request: Exchange) -> Result<Option<Exchange>, DispatchError> {
        let correlation_id = request.correlation_id.clone();
        let receivers = self
            .bus
            .publish(CorrelationEvent::RequestDispatched { exchange: request })
            .await;

        if receivers == 0 {
            warn!(
                component = "bus_dispatcher",
                correlation_id = %correlation_id,
                "No subscribers for RequestDispatched (responder may not be running)"
            );
            if self.require_subscriber {
                return Err(DispatchError::Rejected("no responder subscribed".into()));
            }
        } else {
            debug!(
                component = "bus_dispatcher",
                correlation_id = %correlation_id,
                receivers,
                "Request delivered to {} subscriber(s)",
                receivers
            );
        }

        Ok(None)
    }
}

/// Reply source feeding `ReplyDelivered` events to the ingestion endpoint.
pub struct BusReplySource {
    bus: Arc<InMemoryEventBus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BusReplySource {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            task: Mutex::new(None),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl ReplySource for BusReplySource {
    /// Subscribe to the replies topic and spawn the forwarding task.
    ///
    /// Must be called inside a tokio runtime. The subscription is taken
    /// before returning, so replies published afterwards are not missed.
    fn attach(&self, endpoint: ReplyIngestionEndpoint) {
        let mut stream = self
            .bus
            .event_stream(EventFilter::topics(vec![EventTopic::Replies]));

        let handle = tokio::spawn(async move {
            info!(component = "bus_reply_source", "Listening for ReplyDelivered events");
            while let Some(event) = stream.next().await {
                let CorrelationEvent::ReplyDelivered { exchange } = event else {
                    continue;
                };
                if let Err(e) = endpoint.on_reply_arrived(exchange).await {
                    warn!(component = "bus_reply_source", error = %e, "Failed to ingest reply");
                }
            }
            warn!(component = "bus_reply_source", "Event stream ended, shutting down");
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn detach(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for BusReplySource {
    fn drop(&mut self) {
        self.detach();
    }
}
