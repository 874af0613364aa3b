//! Correlation monitor.
//!
//! Background task that reconciles the reply store against the wait
//! registry. It runs on a fixed interval and whenever the ingestion endpoint
//! nudges it.
//!
//! ## Per-key classification
//!
//! | Key state                      | Action                                         |
//! |--------------------------------|------------------------------------------------|
//! | In recently resolved tracker   | Missed reply: diagnostic event, delete         |
//! | Wait registered                | Claim wait, hand off reply, release gate       |
//! | Neither                        | Keep for a later pass or discard, per policy   |
//! | Neither, kept past its TTL     | Expired: delete                                |
//!
//! A failure on one key is logged and counted. It never stops the scan of
//! the remaining keys, and a failed scan never stops the loop.

use crate::domain::config::UnmatchedReplyPolicy;
use crate::domain::error::{CorrelationError, StoreError};
use crate::domain::key::CorrelationKey;
use crate::domain::registry::WaitRegistry;
use crate::domain::stats::CorrelationStats;
use crate::domain::tracker::RecentlyResolvedTracker;
use crate::ports::outbound::ReplyStore;
use correlation_telemetry::{
    log_correlation_event, DUPLICATE_RESOLUTIONS, EXPIRED_REPLIES, MISSED_REPLIES, MONITOR_ERRORS,
    MONITOR_TICKS,
};
use shared_bus::{CorrelationEvent, EventPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one monitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Keys listed from the store
    pub scanned: usize,
    /// Replies handed to a waiting request
    pub matched: usize,
    /// Late or duplicate replies deleted
    pub missed: usize,
    /// Replies left for a later pass
    pub deferred: usize,
    /// Unknown replies deleted under [`UnmatchedReplyPolicy::Discard`]
    pub discarded: usize,
    /// Retained replies deleted after the unclaimed time-to-live
    pub expired: usize,
    /// Keys whose processing failed
    pub failed: usize,
}

impl TickReport {
    pub fn has_activity(&self) -> bool {
        self.matched + self.missed + self.discarded + self.expired + self.failed > 0
    }
}

enum KeyOutcome {
    Matched,
    Missed,
    Deferred,
    Discarded,
    Expired,
}

/// Reconciles stored replies with pending waits.
pub struct CorrelationMonitor {
    store: Arc<dyn ReplyStore>,
    registry: Arc<WaitRegistry>,
    tracker: Arc<RecentlyResolvedTracker>,
    notifier: Arc<dyn EventPublisher>,
    stats: Arc<CorrelationStats>,
    policy: UnmatchedReplyPolicy,
    unclaimed_ttl: Option<Duration>,
}

impl CorrelationMonitor {
    pub fn new(
        store: Arc<dyn ReplyStore>,
        registry: Arc<WaitRegistry>,
        tracker: Arc<RecentlyResolvedTracker>,
        notifier: Arc<dyn EventPublisher>,
        stats: Arc<CorrelationStats>,
        policy: UnmatchedReplyPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            tracker,
            notifier,
            stats,
            policy,
            unclaimed_ttl: None,
        }
    }

    /// Delete retained replies older than `ttl`. `None` keeps them until
    /// claimed.
    pub fn with_unclaimed_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.unclaimed_ttl = ttl;
        self
    }

    /// Run one pass over the reply store.
    pub async fn tick(&self) -> TickReport {
        MONITOR_TICKS.inc();
        CorrelationStats::incr(&self.stats.total_monitor_ticks);

        let mut report = TickReport::default();
        let keys = match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                MONITOR_ERRORS.with_label_values(&["list"]).inc();
                warn!(component = "monitor", error = %e, "Failed to list reply store");
                return report;
            }
        };

        report.scanned = keys.len();
        for key in keys {
            match self.process_key(&key).await {
                Ok(KeyOutcome::Matched) => report.matched += 1,
                Ok(KeyOutcome::Missed) => report.missed += 1,
                Ok(KeyOutcome::Deferred) => report.deferred += 1,
                Ok(KeyOutcome::Discarded) => report.discarded += 1,
                Ok(KeyOutcome::Expired) => report.expired += 1,
                Err(e) => {
                    report.failed += 1;
                    log_correlation_event!(warn, "monitor", "Failed to process stored reply", key, error = %e);
                }
            }
        }
        report
    }

    async fn process_key(&self, key: &CorrelationKey) -> Result<KeyOutcome, CorrelationError> {
        if self.tracker.contains(key) {
            return self.discard_missed(key).await;
        }

        if !self.registry.contains(key) {
            return self.process_unmatched(key).await;
        }

        let stored = self.store.retrieve(key).await.inspect_err(|_| {
            MONITOR_ERRORS.with_label_values(&["retrieve"]).inc();
        })?;

        // The requester may have timed out since the check above
        let Some(wait) = self.registry.claim(key) else {
            return Ok(KeyOutcome::Deferred);
        };

        if wait.gate.publish(stored.exchange).is_err() {
            DUPLICATE_RESOLUTIONS.inc();
            MONITOR_ERRORS.with_label_values(&["publish"]).inc();
            CorrelationStats::incr(&self.stats.total_duplicate_resolutions);
            log_correlation_event!(error, "monitor", "Duplicate result for in-flight request", key);
            self.notifier
                .publish(CorrelationEvent::DuplicateResolution {
                    correlation_key: key.to_string(),
                })
                .await;
            return Err(CorrelationError::DuplicateResolution(key.clone()));
        }

        self.tracker.record(key.clone());
        wait.gate.release();
        log_correlation_event!(
            debug,
            "monitor",
            "Reply handed to waiting request",
            key,
            waited_ms = u64::try_from(wait.age().as_millis()).unwrap_or(u64::MAX)
        );

        // The wait is already resolved; a leftover entry is classified as
        // missed on the next pass.
        if let Err(e) = self.remove_stored(key).await {
            log_correlation_event!(warn, "monitor", "Failed to delete matched reply", key, error = %e);
        }
        Ok(KeyOutcome::Matched)
    }

    async fn process_unmatched(&self, key: &CorrelationKey) -> Result<KeyOutcome, CorrelationError> {
        if self.policy == UnmatchedReplyPolicy::Discard {
            self.remove_stored(key).await?;
            log_correlation_event!(debug, "monitor", "Discarded reply with no known wait", key);
            return Ok(KeyOutcome::Discarded);
        }

        let Some(ttl) = self.unclaimed_ttl else {
            return Ok(KeyOutcome::Deferred);
        };
        let age = match self.store.retrieve(key).await {
            Ok(stored) => stored.age(),
            Err(StoreError::NotFound(_)) => return Ok(KeyOutcome::Deferred),
            Err(e) => {
                MONITOR_ERRORS.with_label_values(&["retrieve"]).inc();
                return Err(e.into());
            }
        };
        if age < ttl {
            return Ok(KeyOutcome::Deferred);
        }

        // A wait may have been registered since the check above
        if self.registry.contains(key) {
            return Ok(KeyOutcome::Deferred);
        }
        self.remove_stored(key).await?;
        EXPIRED_REPLIES.inc();
        CorrelationStats::incr(&self.stats.total_expired_replies);
        log_correlation_event!(
            debug,
            "monitor",
            "Removed unclaimed reply past its time-to-live",
            key,
            age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX)
        );
        Ok(KeyOutcome::Expired)
    }

    async fn discard_missed(&self, key: &CorrelationKey) -> Result<KeyOutcome, CorrelationError> {
        MISSED_REPLIES.inc();
        CorrelationStats::incr(&self.stats.total_missed_replies);
        log_correlation_event!(warn, "monitor", "Missed async reply for already resolved request", key);
        self.notifier
            .publish(CorrelationEvent::MissedAsyncReply {
                correlation_key: key.to_string(),
            })
            .await;
        self.remove_stored(key).await?;
        Ok(KeyOutcome::Missed)
    }

    async fn remove_stored(&self, key: &CorrelationKey) -> Result<(), CorrelationError> {
        self.store.remove(key).await.map_err(|e| {
            MONITOR_ERRORS.with_label_values(&["remove"]).inc();
            e.into()
        })
    }

    /// Spawn the monitor loop on the current runtime.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration, nudge: Arc<Notify>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                component = "monitor",
                poll_interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
                "Correlation monitor started"
            );

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                    _ = nudge.notified() => {}
                    _ = interval.tick() => {}
                }

                let report = self.tick().await;
                if report.has_activity() {
                    debug!(
                        component = "monitor",
                        scanned = report.scanned,
                        matched = report.matched,
                        missed = report.missed,
                        deferred = report.deferred,
                        discarded = report.discarded,
                        expired = report.expired,
                        failed = report.failed,
                        "Monitor pass finished"
                    );
                }
            }

            info!(component = "monitor", "Correlation monitor stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Handle to a running monitor loop. Dropping it signals the loop to stop.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(component = "monitor", error = %e, "Monitor task ended abnormally");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
