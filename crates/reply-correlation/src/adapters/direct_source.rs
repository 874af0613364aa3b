//! Reply source for callback-style transports.
//!
//! The transport holds a [`DirectReplySource`] and calls
//! [`DirectReplySource::deliver`] from its own receive callback.

use crate::domain::error::CorrelationError;
use crate::domain::key::CorrelationKey;
use crate::ingest::ReplyIngestionEndpoint;
use crate::ports::outbound::ReplySource;
use parking_lot::RwLock;
use shared_types::Exchange;

/// Reply source handing replies straight to the ingestion endpoint.
#[derive(Debug, Default)]
pub struct DirectReplySource {
    endpoint: RwLock<Option<ReplyIngestionEndpoint>>,
}

impl DirectReplySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.endpoint.read().is_some()
    }

    /// Deliver an inbound reply.
    pub async fn deliver(&self, reply: Exchange) -> Result<CorrelationKey, CorrelationError> {
        let endpoint = self
            .endpoint
            .read()
            .clone()
            .ok_or(CorrelationError::NoReplySource)?;
        endpoint.on_reply_arrived(reply).await
    }
}

impl ReplySource for DirectReplySource {
    fn attach(&self, endpoint: ReplyIngestionEndpoint) {
        *self.endpoint.write() = Some(endpoint);
    }

    fn detach(&self) {
        self.endpoint.write().take();
    }
}
