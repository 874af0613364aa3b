//! In-process counters for one correlation service.
//!
//! Prometheus metrics are process-global; these counters are per service
//! instance so tests and embedders can inspect a single engine.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation statistics
#[derive(Debug, Default)]
pub struct CorrelationStats {
    /// Requests dispatched with a registered wait
    pub total_requests: AtomicU64,
    /// Requests dispatched without correlation
    pub total_pass_through: AtomicU64,
    /// Requests resolved with their reply
    pub total_matched: AtomicU64,
    /// Requests whose wait timed out
    pub total_timeouts: AtomicU64,
    /// Requests interrupted by their caller
    pub total_interrupted: AtomicU64,
    /// Requests whose dispatch failed
    pub total_dispatch_failures: AtomicU64,
    /// Replies accepted by the ingestion endpoint
    pub total_replies_ingested: AtomicU64,
    /// Late or duplicate replies discarded by the monitor
    pub total_missed_replies: AtomicU64,
    /// Replies that tried to resolve an already resolved wait
    pub total_duplicate_resolutions: AtomicU64,
    /// Unclaimed replies removed after their time-to-live
    pub total_expired_replies: AtomicU64,
    /// Monitor scans
    pub total_monitor_ticks: AtomicU64,
}

impl CorrelationStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_pass_through: self.total_pass_through.load(Ordering::Relaxed),
            total_matched: self.total_matched.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            total_interrupted: self.total_interrupted.load(Ordering::Relaxed),
            total_dispatch_failures: self.total_dispatch_failures.load(Ordering::Relaxed),
            total_replies_ingested: self.total_replies_ingested.load(Ordering::Relaxed),
            total_missed_replies: self.total_missed_replies.load(Ordering::Relaxed),
            total_duplicate_resolutions: self.total_duplicate_resolutions.load(Ordering::Relaxed),
            total_expired_replies: self.total_expired_replies.load(Ordering::Relaxed),
            total_monitor_ticks: self.total_monitor_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`CorrelationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_pass_through: u64,
    pub total_matched: u64,
    pub total_timeouts: u64,
    pub total_interrupted: u64,
    pub total_dispatch_failures: u64,
    pub total_replies_ingested: u64,
    pub total_missed_replies: u64,
    pub total_duplicate_resolutions: u64,
    pub total_expired_replies: u64,
    pub total_monitor_ticks: u64,
}
