//! Reply ingestion endpoint.
//!
//! Inbound replies land here, on whatever task delivered them. The reply is
//! written to the reply store and the monitor is nudged to scan immediately.
//! The endpoint never resolves a wait itself.

use crate::domain::error::CorrelationError;
use crate::domain::key::{CorrelationKey, KeyStrategy};
use crate::domain::stats::CorrelationStats;
use crate::ports::outbound::{ReplyStore, StoredReply};
use correlation_telemetry::{log_correlation_event, REPLIES_INGESTED};
use shared_types::Exchange;
use std::sync::Arc;
use tokio::sync::Notify;

/// Sink for inbound replies. Cheap to clone.
#[derive(Clone)]
pub struct ReplyIngestionEndpoint {
    store: Arc<dyn ReplyStore>,
    key_strategy: KeyStrategy,
    nudge: Arc<Notify>,
    stats: Arc<CorrelationStats>,
}

impl ReplyIngestionEndpoint {
    pub(crate) fn new(
        store: Arc<dyn ReplyStore>,
        key_strategy: KeyStrategy,
        nudge: Arc<Notify>,
        stats: Arc<CorrelationStats>,
    ) -> Self {
        Self {
            store,
            key_strategy,
            nudge,
            stats,
        }
    }

    /// Store `reply` under its correlation key and wake the monitor.
    pub async fn on_reply_arrived(&self, reply: Exchange) -> Result<CorrelationKey, CorrelationError> {
        let key = (self.key_strategy)(&reply);
        self.store
            .store(StoredReply::new(key.clone(), reply))
            .await?;

        REPLIES_INGESTED.inc();
        CorrelationStats::incr(&self.stats.total_replies_ingested);
        log_correlation_event!(debug, "ingest", "Reply stored", key);

        // A permit is kept if the monitor is mid-scan, so the next pass is not lost.
        self.nudge.notify_one();
        Ok(key)
    }
}

impl std::fmt::Debug for ReplyIngestionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyIngestionEndpoint").finish_non_exhaustive()
    }
}
