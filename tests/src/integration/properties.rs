//! # Correlation Properties
//!
//! Exclusivity of resolution, late-reply discard, session merge, bounded
//! tracker memory and pass-through behaviour.

#[cfg(test)]
mod tests {
    use crate::support::{
        bus_service, deliver, fast_config, reply_to_request, spawn_responder,
        wait_for_diagnostic, ResponderMode,
    };
    use async_trait::async_trait;
    use reply_correlation::{
        BusDispatcher, CorrelationConfig, CorrelationError, CorrelationKey, DirectReplySource,
        DispatchError, Dispatcher, RecentlyResolvedTracker, ReplyTimeout, RequestReplyApi,
        RequestReplyService, DEFAULT_RECENTLY_RESOLVED_CAPACITY,
    };
    use serde_json::json;
    use shared_bus::{CorrelationEvent, EventFilter, EventTopic, InMemoryEventBus};
    use shared_types::Exchange;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Dispatcher answering synchronously, like a request/response transport.
    struct SyncEchoDispatcher;

    #[async_trait]
    impl Dispatcher for SyncEchoDispatcher {
        async fn dispatch(&self, request: Exchange) -> Result<Option<Exchange>, DispatchError> {
            Ok(Some(reply_to_request(&request)))
        }
    }

    /// Dispatcher that sends nothing; replies are delivered by the test.
    struct NullDispatcher;

    #[async_trait]
    impl Dispatcher for NullDispatcher {
        async fn dispatch(&self, _request: Exchange) -> Result<Option<Exchange>, DispatchError> {
            Ok(None)
        }
    }

    // =============================================================================
    // EXCLUSIVITY
    // =============================================================================

    /// Every reply is sent twice; each request is resolved exactly once and
    /// no duplicate resolution is reported.
    #[tokio::test]
    async fn test_duplicate_replies_resolve_once() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(&bus, fast_config()).unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Duplicate);

        for i in 0..20 {
            let mut request = Exchange::new(format!("dup-{i}"), json!(i));
            let reply = service.request(&mut request).await.unwrap().unwrap();
            assert_eq!(reply.payload, json!({ "echo": i }));
        }

        // Let the monitor drain the second copies
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = service.stats();
        assert_eq!(stats.total_matched, 20);
        assert_eq!(stats.total_duplicate_resolutions, 0);
        assert_eq!(service.pending_count(), 0);
    }

    /// Two deliveries racing for the same wait: one resolves it, the other
    /// is recognised as missed once the first has been handed off.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_deliveries_single_resolution() {
        let source = Arc::new(DirectReplySource::new());
        let service = Arc::new(
            RequestReplyService::builder(Arc::new(NullDispatcher))
                .config(fast_config())
                .reply_source(source.clone())
                .build()
                .unwrap(),
        );

        let requester = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut request = Exchange::new("race", json!(null));
                service.request(&mut request).await
            })
        };
        let key = CorrelationKey::new("race-NOT_SET");
        while !service.is_pending(&key) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let deliveries: Vec<_> = (0..2)
            .map(|n| {
                let source = source.clone();
                tokio::spawn(async move {
                    source
                        .deliver(Exchange::new("race", json!(n)))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for delivery in deliveries {
            delivery.await.unwrap();
        }

        let reply = requester.await.unwrap().unwrap().unwrap();
        assert!(reply.payload == json!(0) || reply.payload == json!(1));

        // A copy stored after the hand-off is classified as missed
        source
            .deliver(Exchange::new("race", json!("third")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = service.stats();
        assert_eq!(stats.total_matched, 1);
        assert_eq!(stats.total_duplicate_resolutions, 0);
        assert!(stats.total_missed_replies >= 1);
    }

    // =============================================================================
    // LATE REPLY DISCARD
    // =============================================================================

    /// A late reply for one key is discarded while an unrelated request in
    /// flight at the same time completes normally.
    #[tokio::test]
    async fn test_late_reply_does_not_affect_other_requests() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = Arc::new(bus_service(&bus, fast_config()).unwrap());
        let mut diagnostics = bus.subscribe(EventFilter::topics(vec![EventTopic::Diagnostics]));

        let mut stale = Exchange::new("stale", json!(null));
        let timed_out = service
            .request_reply(&mut stale, ReplyTimeout::from_millis(30), None)
            .await;
        assert!(timed_out.is_err());

        let healthy = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut request = Exchange::new("healthy", json!("ok"));
                service.request(&mut request).await
            })
        };
        while service.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        deliver(&bus, reply_to_request(&stale)).await;
        deliver(&bus, reply_to_request(&Exchange::new("healthy", json!("ok")))).await;

        let reply = healthy.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.correlation_id, "healthy");

        let missed = wait_for_diagnostic(&mut diagnostics, Duration::from_secs(2), |event| {
            matches!(event, CorrelationEvent::MissedAsyncReply { .. })
        })
        .await;
        assert!(matches!(
            missed,
            Some(CorrelationEvent::MissedAsyncReply { ref correlation_key }) if correlation_key == "stale-NOT_SET"
        ));
    }

    /// Reusing a key after its reply was matched: the leftover copy of the
    /// old reply is never handed to the new request.
    #[tokio::test]
    async fn test_stale_copy_not_delivered_to_reused_key() {
        let source = Arc::new(DirectReplySource::new());
        let service = RequestReplyService::builder(Arc::new(NullDispatcher))
            .config(CorrelationConfig {
                fail_on_timeout: false,
                ..fast_config()
            })
            .reply_source(source.clone())
            .build()
            .unwrap();

        let mut first = Exchange::new("reused", json!(1));
        let timed_out = service
            .request_reply(&mut first, ReplyTimeout::from_millis(20), None)
            .await
            .unwrap();
        assert!(timed_out.is_none());

        // Old reply arrives while a new request with the same key waits
        let mut second = Exchange::new("reused", json!(2));
        let (result, _) = tokio::join!(
            service.request_reply(&mut second, ReplyTimeout::from_millis(150), None),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                source
                    .deliver(Exchange::new("reused", json!("old")))
                    .await
                    .unwrap();
            }
        );

        assert!(result.unwrap().is_none());
        assert_eq!(service.stats().total_matched, 0);
        assert!(service.stats().total_missed_replies >= 1);
    }

    // =============================================================================
    // SESSION MERGE
    // =============================================================================

    /// Session properties set by the responder are visible on the request.
    #[tokio::test]
    async fn test_reply_session_merged_into_request() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(&bus, fast_config()).unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Echo);

        let mut request = Exchange::new("session", json!(null));
        request.session.set("tenant", "acme");
        request.session.set("handled_by", "nobody");

        let api: &dyn RequestReplyApi = &service;
        let reply = api.request(&mut request).await.unwrap().unwrap();

        assert_eq!(request.session.get("tenant"), Some(&json!("acme")));
        assert_eq!(request.session.get("handled_by"), Some(&json!("bus-responder")));
        assert_eq!(reply.session, request.session);
    }

    // =============================================================================
    // BOUNDED MEMORY
    // =============================================================================

    /// The tracker keeps at most its capacity and evicts oldest first.
    #[test]
    fn test_tracker_bounded_at_default_capacity() {
        let tracker = RecentlyResolvedTracker::default();
        let extra = 10_000;
        for i in 0..DEFAULT_RECENTLY_RESOLVED_CAPACITY + extra {
            tracker.record(CorrelationKey::new(format!("k{i}")));
        }

        assert_eq!(tracker.len(), DEFAULT_RECENTLY_RESOLVED_CAPACITY);
        assert_eq!(tracker.oldest(), Some(CorrelationKey::new(format!("k{extra}"))));
        assert!(!tracker.contains(&CorrelationKey::new("k0")));
        assert!(tracker.contains(&CorrelationKey::new(format!(
            "k{}",
            DEFAULT_RECENTLY_RESOLVED_CAPACITY + extra - 1
        ))));
    }

    /// Resolving more keys than the configured capacity does not grow the
    /// service's tracker.
    #[tokio::test]
    async fn test_service_tracker_stays_bounded() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(
            &bus,
            CorrelationConfig {
                recently_resolved_capacity: 25,
                ..fast_config()
            },
        )
        .unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Echo);

        for i in 0..60 {
            let mut request = Exchange::new(format!("bounded-{i}"), json!(i));
            service.request(&mut request).await.unwrap();
        }

        assert_eq!(service.recently_resolved_count(), 25);
        assert!(!service.is_recently_resolved(&CorrelationKey::new("bounded-0-NOT_SET")));
        assert!(service.is_recently_resolved(&CorrelationKey::new("bounded-59-NOT_SET")));
    }

    // =============================================================================
    // PASS-THROUGH
    // =============================================================================

    /// Without a reply source the transport's own result is returned and no
    /// wait is ever registered.
    #[tokio::test]
    async fn test_pass_through_returns_dispatch_result() {
        let service = RequestReplyService::builder(Arc::new(SyncEchoDispatcher))
            .config(fast_config())
            .build()
            .unwrap();

        let mut request = Exchange::new("plain", json!("hello"));
        let reply = service.request(&mut request).await.unwrap().unwrap();

        assert_eq!(reply.payload, json!({ "echo": "hello" }));
        let stats = service.stats();
        assert_eq!(stats.total_pass_through, 1);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(service.pending_count(), 0);
        assert_eq!(service.recently_resolved_count(), 0);
    }

    /// Over the bus without a reply source, dispatch is fire-and-forget.
    #[tokio::test]
    async fn test_pass_through_over_bus() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut requests = bus.subscribe(EventFilter::topics(vec![EventTopic::Requests]));
        let service = RequestReplyService::builder(Arc::new(BusDispatcher::new(bus.clone())))
            .config(fast_config())
            .build()
            .unwrap();

        let mut request = Exchange::new("fire", json!(1));
        assert!(service.request(&mut request).await.unwrap().is_none());
        assert!(matches!(
            requests.recv().await,
            Some(CorrelationEvent::RequestDispatched { .. })
        ));
        assert_eq!(service.pending_count(), 0);
    }

    /// Detaching the reply source switches later requests to pass-through.
    #[tokio::test]
    async fn test_clearing_reply_source_disables_correlation() {
        let service = RequestReplyService::builder(Arc::new(SyncEchoDispatcher))
            .config(fast_config())
            .reply_source(Arc::new(DirectReplySource::new()))
            .build()
            .unwrap();
        assert!(service.has_reply_source());

        service.clear_reply_source();

        let mut request = Exchange::new("detached", json!(1));
        let reply = service
            .request_reply(&mut request, ReplyTimeout::from_millis(10), None)
            .await
            .unwrap();
        assert!(reply.is_some());
        assert_eq!(service.stats().total_pass_through, 1);
    }

    /// Errors from a failing transport surface unchanged in pass-through.
    #[tokio::test]
    async fn test_pass_through_dispatch_error() {
        struct Closed;

        #[async_trait]
        impl Dispatcher for Closed {
            async fn dispatch(&self, _: Exchange) -> Result<Option<Exchange>, DispatchError> {
                Err(DispatchError::ChannelClosed)
            }
        }

        let service = RequestReplyService::builder(Arc::new(Closed))
            .config(fast_config())
            .build()
            .unwrap();
        let mut request = Exchange::new("closed", json!(null));
        assert!(matches!(
            service.request(&mut request).await,
            Err(CorrelationError::Dispatch(DispatchError::ChannelClosed))
        ));
    }
}
