//! # Request/Reply Flows
//!
//! A requester and an independent responder connected only through the
//! shared bus. Covers the reply-matched, timed-out, late-reply and
//! concurrent-load flows.

#[cfg(test)]
mod tests {
    use crate::support::{
        bus_service, deliver, fast_config, reply_to_request, spawn_responder,
        wait_for_diagnostic, ResponderMode,
    };
    use reply_correlation::{CorrelationConfig, CorrelationError, CorrelationKey, ReplyTimeout};
    use serde_json::json;
    use shared_bus::{CorrelationEvent, EventFilter, EventTopic, InMemoryEventBus};
    use shared_types::Exchange;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    // =============================================================================
    // REPLY MATCHED
    // =============================================================================

    /// A reply delivered 50ms after dispatch resolves the waiting request
    /// within one monitor pass.
    #[tokio::test]
    async fn test_delayed_reply_is_matched() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(
            &bus,
            CorrelationConfig {
                monitor_poll_interval_ms: 100,
                ..fast_config()
            },
        )
        .unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Delayed(Duration::from_millis(50)));

        let mut request = Exchange::new("c1", json!("ping"));
        let started = Instant::now();
        let reply = service
            .request_reply(&mut request, ReplyTimeout::from_millis(5_000), None)
            .await
            .unwrap()
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reply.correlation_id, "c1");
        assert_eq!(reply.payload, json!({ "echo": "ping" }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
        assert!(!service.is_pending(&CorrelationKey::new("c1-NOT_SET")));
        assert_eq!(service.pending_count(), 0);
    }

    /// Ingestion wakes the monitor, so a reply is matched long before the
    /// next periodic pass.
    #[tokio::test]
    async fn test_ingested_reply_does_not_wait_for_poll() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(
            &bus,
            CorrelationConfig {
                monitor_poll_interval_ms: 5_000,
                ..fast_config()
            },
        )
        .unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Delayed(Duration::from_millis(50)));

        let mut request = Exchange::new("nudged", json!("ping"));
        let started = Instant::now();
        let reply = service
            .request_reply(&mut request, ReplyTimeout::from_millis(10_000), None)
            .await
            .unwrap()
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reply.correlation_id, "nudged");
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    }

    /// The outgoing request carries a reply route whose token is the key.
    #[tokio::test]
    async fn test_dispatched_request_carries_reply_route() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(&bus, fast_config()).unwrap();
        let mut requests = bus.subscribe(EventFilter::topics(vec![EventTopic::Requests]));
        let _responder = spawn_responder(bus.clone(), ResponderMode::Echo);

        let mut request = Exchange::new("routed", json!(null)).with_sequence(7);
        service.request(&mut request).await.unwrap();

        match requests.recv().await {
            Some(CorrelationEvent::RequestDispatched { exchange }) => {
                let route = exchange.reply_to.unwrap();
                assert_eq!(route.address, "replies");
                assert_eq!(route.token, "routed-7");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // =============================================================================
    // TIMEOUT
    // =============================================================================

    /// With no reply, the request fails after the timeout plus at most the
    /// grace period, and the key is marked resolved.
    #[tokio::test]
    async fn test_missing_reply_times_out() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(
            &bus,
            CorrelationConfig {
                monitor_grace_period_ms: 1_000,
                ..fast_config()
            },
        )
        .unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Silent);

        let mut request = Exchange::new("c2", json!("ping"));
        let started = Instant::now();
        let err = service
            .request_reply(&mut request, ReplyTimeout::from_millis(200), None)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        let key = CorrelationKey::new("c2-NOT_SET");
        assert!(matches!(err, CorrelationError::Timeout { ref key, timeout_ms: 200 } if key.as_str() == "c2-NOT_SET"));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(2_000), "took {elapsed:?}");
        assert!(service.is_recently_resolved(&key));
        assert!(!service.is_pending(&key));
    }

    // =============================================================================
    // LATE REPLY
    // =============================================================================

    /// A reply arriving after its request timed out is discarded with a
    /// diagnostic and resolves nothing.
    #[tokio::test]
    async fn test_reply_after_timeout_is_discarded() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(&bus, fast_config()).unwrap();
        let mut diagnostics = bus.subscribe(EventFilter::topics(vec![EventTopic::Diagnostics]));

        let mut request = Exchange::new("c2", json!("ping"));
        let result = service
            .request_reply(&mut request, ReplyTimeout::from_millis(50), None)
            .await;
        assert!(matches!(result, Err(CorrelationError::Timeout { .. })));

        deliver(&bus, reply_to_request(&request)).await;

        let missed = wait_for_diagnostic(&mut diagnostics, Duration::from_secs(2), |event| {
            matches!(event, CorrelationEvent::MissedAsyncReply { .. })
        })
        .await;
        match missed {
            Some(CorrelationEvent::MissedAsyncReply { correlation_key }) => {
                assert_eq!(correlation_key, "c2-NOT_SET");
            }
            other => panic!("expected missed reply diagnostic, got {other:?}"),
        }

        let stats = service.stats();
        assert_eq!(stats.total_missed_replies, 1);
        assert_eq!(stats.total_matched, 0);
        assert_eq!(service.pending_count(), 0);
    }

    // =============================================================================
    // CONCURRENT LOAD
    // =============================================================================

    /// 1000 concurrent requests with replies delivered out of order on
    /// separate tasks each receive exactly their own reply.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_receive_own_replies() {
        const REQUESTS: usize = 1_000;

        let bus = Arc::new(InMemoryEventBus::new());
        let service = Arc::new(bus_service(&bus, fast_config()).unwrap());
        let _responder = spawn_responder(bus.clone(), ResponderMode::RandomDelay { max_ms: 50 });

        let handles: Vec<_> = (0..REQUESTS)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    let mut request = Exchange::new(format!("load-{i}"), json!(i));
                    let reply = service
                        .request_reply(&mut request, ReplyTimeout::from_millis(10_000), None)
                        .await
                        .unwrap()
                        .unwrap();
                    (i, reply)
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let (i, reply) = handle.await.unwrap();
            assert_eq!(reply.correlation_id, format!("load-{i}"));
            assert_eq!(reply.payload, json!({ "echo": i }));
            assert!(seen.insert(i));
        }

        assert_eq!(seen.len(), REQUESTS);
        assert_eq!(service.pending_count(), 0);
        let stats = service.stats();
        assert_eq!(stats.total_matched, REQUESTS as u64);
        assert_eq!(stats.total_timeouts, 0);
        assert_eq!(stats.total_duplicate_resolutions, 0);
    }

    /// A burst several times the bus backlog threshold, on the default bus,
    /// loses no reply.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reply_burst_on_default_bus() {
        const REQUESTS: usize = 3_000;

        let bus = Arc::new(InMemoryEventBus::new());
        let service = Arc::new(bus_service(&bus, fast_config()).unwrap());
        let _responder = spawn_responder(bus.clone(), ResponderMode::Echo);

        let handles: Vec<_> = (0..REQUESTS)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    let mut request = Exchange::new(format!("burst-{i}"), json!(i));
                    service
                        .request_reply(&mut request, ReplyTimeout::from_millis(10_000), None)
                        .await
                })
            })
            .collect();

        let mut failed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Some(_)) => {}
                _ => failed += 1,
            }
        }

        let stats = service.stats();
        assert_eq!(failed, 0, "stats: {stats:?}");
        assert_eq!(stats.total_replies_ingested, REQUESTS as u64);
        assert_eq!(stats.total_matched, REQUESTS as u64);
        assert_eq!(stats.total_missed_replies, 0);
        assert_eq!(service.pending_count(), 0);
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    /// Shutdown stops the monitor; later requests are refused.
    #[tokio::test]
    async fn test_shutdown_refuses_new_requests() {
        let bus = Arc::new(InMemoryEventBus::new());
        let service = bus_service(&bus, fast_config()).unwrap();
        let _responder = spawn_responder(bus.clone(), ResponderMode::Echo);

        let mut request = Exchange::new("before", json!(1));
        assert!(service.request(&mut request).await.unwrap().is_some());

        service.shutdown().await;
        assert!(!service.is_monitor_running());

        let mut request = Exchange::new("after", json!(2));
        assert!(matches!(
            service.request(&mut request).await,
            Err(CorrelationError::ShutDown)
        ));
    }
}
