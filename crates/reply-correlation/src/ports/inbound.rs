//! # Inbound Ports (Driving Ports)
//!
//! The request/reply API exposed to callers.

use crate::domain::config::ReplyTimeout;
use crate::domain::error::CorrelationError;
use async_trait::async_trait;
use shared_types::Exchange;
use tokio_util::sync::CancellationToken;

/// Send a request and wait for its asynchronously delivered reply.
#[async_trait]
pub trait RequestReplyApi: Send + Sync {
    /// Dispatch `request` and wait up to `timeout` for the matching reply.
    ///
    /// Returns `Ok(None)` when cancelled through `cancel`, when the request is
    /// not correlated and the transport returned nothing, or on timeout with
    /// `fail_on_timeout` disabled. Session state carried by the reply is
    /// merged into `request.session`.
    async fn request_reply(
        &self,
        request: &mut Exchange,
        timeout: ReplyTimeout,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Exchange>, CorrelationError>;

    /// [`RequestReplyApi::request_reply`] with the configured default timeout.
    async fn request(&self, request: &mut Exchange) -> Result<Option<Exchange>, CorrelationError>;
}
