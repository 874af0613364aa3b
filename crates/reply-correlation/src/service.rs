//! Request/reply service.
//!
//! Owns the wait registry, the recently resolved tracker and the monitor
//! task, and drives each request through
//! `DISPATCHED -> WAITING -> {MATCHED | TIMED_OUT | INTERRUPTED}`.
//!
//! ## Flow
//!
//! 1. Requests that are not correlated (no reply source, or rejected by the
//!    predicate) are dispatched and the transport's result is returned.
//! 2. Otherwise a wait is registered under the request's correlation key,
//!    the request is dispatched and the caller waits on the gate.
//! 3. After an apparent timeout the caller waits one grace period more to
//!    absorb a monitor pass that is already handing off the reply.
//! 4. The wait is removed exactly once on every exit path.

use crate::adapters::memory_store::InMemoryReplyStore;
use crate::adapters::scoped_store::ScopedReplyStore;
use crate::domain::config::{CorrelationConfig, ReplyTimeout};
use crate::domain::error::CorrelationError;
use crate::domain::gate::ReplyGate;
use crate::domain::key::{default_key_strategy, CorrelationKey, KeyStrategy};
use crate::domain::registry::WaitRegistry;
use crate::domain::stats::{CorrelationStats, StatsSnapshot};
use crate::domain::tracker::RecentlyResolvedTracker;
use crate::ingest::ReplyIngestionEndpoint;
use crate::monitor::{CorrelationMonitor, MonitorHandle};
use crate::ports::inbound::RequestReplyApi;
use crate::ports::outbound::{accept_all, CorrelatePredicate, Dispatcher, ReplySource, ReplyStore};
use async_trait::async_trait;
use correlation_telemetry::{log_correlation_event, REPLY_LATENCY, REQUESTS_TOTAL};
use parking_lot::{Mutex, RwLock};
use shared_bus::{CorrelationEvent, EventPublisher, InMemoryEventBus};
use shared_types::{Exchange, ReplyRoute};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Terminal state of one correlated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Matched,
    TimedOut,
    Interrupted,
}

enum GateWait {
    Released,
    Elapsed,
    Cancelled,
}

/// Wait for `gate`, bounded by `limit` when given, racing `cancel`.
async fn wait_gate(
    gate: &ReplyGate,
    limit: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> GateWait {
    let released = async {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, gate.wait()).await {
                Ok(()) => GateWait::Released,
                Err(_) => GateWait::Elapsed,
            },
            None => {
                gate.wait().await;
                GateWait::Released
            }
        }
    };
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        outcome = released => outcome,
        _ = cancelled => GateWait::Cancelled,
    }
}

/// Removes a registered wait when the request leaves, on every path
/// including a dropped future.
struct WaitRegistration<'a> {
    registry: &'a WaitRegistry,
    tracker: &'a RecentlyResolvedTracker,
    key: &'a CorrelationKey,
    gate: &'a Arc<ReplyGate>,
    dispatched: bool,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        if self.dispatched && !self.gate.is_released() {
            // Abandoned while still waiting: a reply may still come in
            self.tracker.record(self.key.clone());
        }
        self.registry.claim_own(self.key, self.gate);
    }
}

/// Asynchronous request/reply correlation engine.
pub struct RequestReplyService {
    config: CorrelationConfig,
    dispatcher: Arc<dyn Dispatcher>,
    store: Arc<dyn ReplyStore>,
    notifier: Arc<dyn EventPublisher>,
    registry: Arc<WaitRegistry>,
    tracker: Arc<RecentlyResolvedTracker>,
    stats: Arc<CorrelationStats>,
    key_strategy: KeyStrategy,
    should_correlate: CorrelatePredicate,
    reply_to: Option<String>,
    reply_source: RwLock<Option<Arc<dyn ReplySource>>>,
    nudge: Arc<Notify>,
    monitor: Arc<CorrelationMonitor>,
    monitor_handle: Mutex<Option<MonitorHandle>>,
    shut_down: AtomicBool,
}

impl RequestReplyService {
    /// Start building a service around `dispatcher`.
    pub fn builder(dispatcher: Arc<dyn Dispatcher>) -> RequestReplyServiceBuilder {
        RequestReplyServiceBuilder::new(dispatcher)
    }

    /// Wire `source` to this service's ingestion endpoint.
    ///
    /// Replaces (and detaches) any previous reply source. Enables
    /// correlation for subsequent requests.
    pub fn set_reply_source(&self, source: Arc<dyn ReplySource>) -> Result<(), CorrelationError> {
        if self.is_shut_down() {
            return Err(CorrelationError::ShutDown);
        }
        source.attach(self.reply_endpoint());
        if let Some(previous) = self.reply_source.write().replace(source) {
            previous.detach();
        }
        Ok(())
    }

    /// Detach the current reply source. Later requests run as pass-through.
    pub fn clear_reply_source(&self) {
        if let Some(previous) = self.reply_source.write().take() {
            previous.detach();
        }
    }

    pub fn has_reply_source(&self) -> bool {
        self.reply_source.read().is_some()
    }

    /// The endpoint inbound replies are delivered to.
    pub fn reply_endpoint(&self) -> ReplyIngestionEndpoint {
        ReplyIngestionEndpoint::new(
            self.store.clone(),
            self.key_strategy.clone(),
            self.nudge.clone(),
            self.stats.clone(),
        )
    }

    /// Send `request` and wait for its reply with the configured timeout.
    pub async fn request(&self, request: &mut Exchange) -> Result<Option<Exchange>, CorrelationError> {
        self.request_reply(request, self.config.default_timeout(), None)
            .await
    }

    /// Send `request` and wait up to `timeout` for the matching reply.
    ///
    /// Returns `Ok(None)` when `cancel` fires before the reply, or on timeout
    /// when `fail_on_timeout` is disabled. Session properties of the reply
    /// are merged into `request.session`.
    #[instrument(
        skip(self, request, cancel),
        fields(correlation_id = %request.correlation_id)
    )]
    pub async fn request_reply(
        &self,
        request: &mut Exchange,
        timeout: ReplyTimeout,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Exchange>, CorrelationError> {
        if self.is_shut_down() {
            return Err(CorrelationError::ShutDown);
        }

        if !self.has_reply_source() || !(self.should_correlate)(&*request) {
            return self.pass_through(request).await;
        }

        let key = (self.key_strategy)(&*request);
        let gate = self
            .registry
            .register(key.clone())
            .map_err(CorrelationError::DuplicateWait)?;
        let mut registration = WaitRegistration {
            registry: &self.registry,
            tracker: &self.tracker,
            key: &key,
            gate: &gate,
            dispatched: false,
        };
        CorrelationStats::incr(&self.stats.total_requests);
        let started = Instant::now();

        let mut outgoing = request.clone();
        if let Some(address) = &self.reply_to {
            outgoing.reply_to = Some(ReplyRoute {
                address: address.clone(),
                token: key.to_string(),
            });
        }

        if let Err(e) = self.dispatcher.dispatch(outgoing).await {
            REQUESTS_TOTAL.with_label_values(&["dispatch_failed"]).inc();
            CorrelationStats::incr(&self.stats.total_dispatch_failures);
            log_correlation_event!(warn, "requester", "Dispatch failed", key, error = %e);
            return Err(e.into());
        }
        registration.dispatched = true;
        log_correlation_event!(debug, "requester", "Request dispatched, waiting for reply", key);

        let outcome = self.await_reply(&key, &gate, timeout, cancel).await;
        drop(registration);

        match outcome {
            WaitOutcome::Matched => {
                let Some(mut reply) = gate.take_reply() else {
                    return Err(CorrelationError::MissingResolvedReply(key));
                };
                request.session.merge_from(&reply.session);
                reply.session = request.session.clone();

                let elapsed = started.elapsed();
                REPLY_LATENCY.observe(elapsed.as_secs_f64());
                REQUESTS_TOTAL.with_label_values(&["matched"]).inc();
                CorrelationStats::incr(&self.stats.total_matched);
                log_correlation_event!(
                    debug,
                    "requester",
                    "Reply matched",
                    key,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
                );
                Ok(Some(reply))
            }
            WaitOutcome::TimedOut => {
                let timeout_ms = timeout.as_millis();
                REQUESTS_TOTAL.with_label_values(&["timed_out"]).inc();
                CorrelationStats::incr(&self.stats.total_timeouts);
                log_correlation_event!(warn, "requester", "Reply timed out", key, timeout_ms);
                self.notifier
                    .publish(CorrelationEvent::ReplyTimedOut {
                        correlation_key: key.to_string(),
                        timeout_ms,
                    })
                    .await;

                if self.config.fail_on_timeout {
                    Err(CorrelationError::Timeout { key, timeout_ms })
                } else {
                    Ok(None)
                }
            }
            WaitOutcome::Interrupted => {
                REQUESTS_TOTAL.with_label_values(&["interrupted"]).inc();
                CorrelationStats::incr(&self.stats.total_interrupted);
                log_correlation_event!(info, "requester", "Wait interrupted", key);
                Ok(None)
            }
        }
    }

    async fn pass_through(&self, request: &Exchange) -> Result<Option<Exchange>, CorrelationError> {
        match self.dispatcher.dispatch(request.clone()).await {
            Ok(reply) => {
                REQUESTS_TOTAL.with_label_values(&["pass_through"]).inc();
                CorrelationStats::incr(&self.stats.total_pass_through);
                Ok(reply)
            }
            Err(e) => {
                REQUESTS_TOTAL.with_label_values(&["dispatch_failed"]).inc();
                CorrelationStats::incr(&self.stats.total_dispatch_failures);
                warn!(
                    component = "requester",
                    correlation_id = %request.correlation_id,
                    error = %e,
                    "Pass-through dispatch failed"
                );
                Err(e.into())
            }
        }
    }

    async fn await_reply(
        &self,
        key: &CorrelationKey,
        gate: &Arc<ReplyGate>,
        timeout: ReplyTimeout,
        cancel: Option<&CancellationToken>,
    ) -> WaitOutcome {
        match wait_gate(gate, timeout.duration(), cancel).await {
            GateWait::Released => return WaitOutcome::Matched,
            GateWait::Cancelled => return self.interrupted(key),
            GateWait::Elapsed => {}
        }

        let grace = self.config.grace_period();
        match wait_gate(gate, Some(grace), cancel).await {
            GateWait::Released => return WaitOutcome::Matched,
            GateWait::Cancelled => return self.interrupted(key),
            GateWait::Elapsed => {}
        }

        // Mark resolved before removing the wait, so the monitor never sees
        // the key as neither pending nor resolved.
        self.tracker.record(key.clone());
        if self.registry.claim_own(key, gate).is_some() {
            return WaitOutcome::TimedOut;
        }

        // The monitor claimed the wait first and is handing off the reply
        match wait_gate(gate, Some(grace), cancel).await {
            GateWait::Released => WaitOutcome::Matched,
            GateWait::Cancelled => WaitOutcome::Interrupted,
            GateWait::Elapsed => WaitOutcome::TimedOut,
        }
    }

    fn interrupted(&self, key: &CorrelationKey) -> WaitOutcome {
        self.tracker.record(key.clone());
        WaitOutcome::Interrupted
    }

    /// Stop the monitor, detach the reply source and dispose the store.
    ///
    /// Idempotent. Requests still waiting are not woken. Store disposal
    /// errors are logged.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.clear_reply_source();

        let handle = self.monitor_handle.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        if let Err(e) = self.store.dispose().await {
            warn!(component = "service", error = %e, "Failed to dispose reply store");
        }

        info!(
            component = "service",
            pending = self.registry.len(),
            "Request/reply service shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.registry.contains(key)
    }

    pub fn is_recently_resolved(&self, key: &CorrelationKey) -> bool {
        self.tracker.contains(key)
    }

    pub fn recently_resolved_count(&self) -> usize {
        self.tracker.len()
    }

    /// Correlation key this service derives for `exchange`.
    pub fn key_for(&self, exchange: &Exchange) -> CorrelationKey {
        (self.key_strategy)(exchange)
    }

    /// The monitor, for running a pass by hand.
    pub fn monitor(&self) -> &Arc<CorrelationMonitor> {
        &self.monitor
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor_handle
            .lock()
            .as_ref()
            .is_some_and(MonitorHandle::is_running)
    }
}

#[async_trait]
impl RequestReplyApi for RequestReplyService {
    async fn request_reply(
        &self,
        request: &mut Exchange,
        timeout: ReplyTimeout,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Exchange>, CorrelationError> {
        RequestReplyService::request_reply(self, request, timeout, cancel).await
    }

    async fn request(&self, request: &mut Exchange) -> Result<Option<Exchange>, CorrelationError> {
        RequestReplyService::request(self, request).await
    }
}

/// Builder for [`RequestReplyService`].
pub struct RequestReplyServiceBuilder {
    dispatcher: Arc<dyn Dispatcher>,
    config: CorrelationConfig,
    store: Option<Arc<dyn ReplyStore>>,
    notifier: Option<Arc<dyn EventPublisher>>,
    key_strategy: KeyStrategy,
    should_correlate: CorrelatePredicate,
    reply_to: Option<String>,
    reply_source: Option<Arc<dyn ReplySource>>,
}

impl RequestReplyServiceBuilder {
    fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            config: CorrelationConfig::default(),
            store: None,
            notifier: None,
            key_strategy: default_key_strategy(),
            should_correlate: accept_all(),
            reply_to: None,
            reply_source: None,
        }
    }

    pub fn config(mut self, config: CorrelationConfig) -> Self {
        self.config = config;
        self
    }

    /// Reply store; defaults to [`InMemoryReplyStore`]. With a
    /// `store_prefix` configured the engine only sees its own namespace of
    /// this store.
    pub fn store(mut self, store: Arc<dyn ReplyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sink for diagnostic events; defaults to a private in-memory bus.
    pub fn notifier(mut self, notifier: Arc<dyn EventPublisher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Shorthand for setting `store_prefix` on the configuration.
    pub fn store_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.store_prefix = Some(prefix.into());
        self
    }

    pub fn key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn should_correlate(mut self, predicate: CorrelatePredicate) -> Self {
        self.should_correlate = predicate;
        self
    }

    /// Stamp outgoing requests with a reply route to `address`, using the
    /// correlation key as token.
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    pub fn reply_source(mut self, source: Arc<dyn ReplySource>) -> Self {
        self.reply_source = Some(source);
        self
    }

    /// Validate the configuration, start the monitor and attach the reply
    /// source. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<RequestReplyService, CorrelationError> {
        self.config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CorrelationError::NoRuntime);
        }

        let mut store: Arc<dyn ReplyStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryReplyStore::new()),
        };
        if let Some(prefix) = &self.config.store_prefix {
            store = Arc::new(ScopedReplyStore::new(store, prefix.clone())?);
        }
        let notifier: Arc<dyn EventPublisher> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(InMemoryEventBus::new()),
        };
        let registry = Arc::new(WaitRegistry::new());
        let tracker = Arc::new(RecentlyResolvedTracker::new(
            self.config.recently_resolved_capacity,
        ));
        let stats = Arc::new(CorrelationStats::default());
        let nudge = Arc::new(Notify::new());

        let monitor = Arc::new(CorrelationMonitor::new(
            store.clone(),
            registry.clone(),
            tracker.clone(),
            notifier.clone(),
            stats.clone(),
            self.config.unmatched_policy,
        )
        .with_unclaimed_ttl(self.config.unclaimed_ttl()));
        let handle = monitor
            .clone()
            .spawn(self.config.poll_interval(), nudge.clone());

        let service = RequestReplyService {
            config: self.config,
            dispatcher: self.dispatcher,
            store,
            notifier,
            registry,
            tracker,
            stats,
            key_strategy: self.key_strategy,
            should_correlate: self.should_correlate,
            reply_to: self.reply_to,
            reply_source: RwLock::new(None),
            nudge,
            monitor,
            monitor_handle: Mutex::new(Some(handle)),
            shut_down: AtomicBool::new(false),
        };

        if let Some(source) = self.reply_source {
            service.set_reply_source(source)?;
        }

        info!(
            component = "service",
            timeout_ms = service.config.timeout_ms,
            poll_interval_ms = service.config.monitor_poll_interval_ms,
            grace_period_ms = service.config.monitor_grace_period_ms,
            "Request/reply service started"
        );
        Ok(service)
    }
}
