//! # Reply-Correlation Benchmarks
//!
//! | Component | Operation | Target |
//! |-----------|-----------|--------|
//! | Wait registry | register + claim | < 1µs |
//! | Recently resolved tracker | record at capacity | < 1µs |
//! | Request/reply | full round trip over the bus | < 1ms + one monitor pass |

// Allow excessive nesting in benchmark code
#![allow(clippy::excessive_nesting)]

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reply_correlation::{
    CorrelationConfig, CorrelationKey, DirectReplySource, DispatchError, Dispatcher,
    RecentlyResolvedTracker, ReplyTimeout, RequestReplyService, WaitRegistry,
};
use serde_json::json;
use shared_types::Exchange;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Wait Registry
// ============================================================================

fn bench_wait_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("wait-registry");

    let registry = WaitRegistry::new();
    let keys: Vec<_> = (0..1_000)
        .map(|i| CorrelationKey::new(format!("bench-{i}")))
        .collect();

    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("register_claim_1000", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(registry.register(key.clone()).is_ok());
            }
            for key in &keys {
                black_box(registry.claim(key));
            }
        })
    });

    group.finish();
}

// ============================================================================
// Recently Resolved Tracker
// ============================================================================

fn bench_tracker_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("recently-resolved");

    for capacity in [1_000usize, 50_000] {
        let tracker = RecentlyResolvedTracker::new(capacity);
        for i in 0..capacity {
            tracker.record(CorrelationKey::new(format!("warm-{i}")));
        }

        let mut next = 0u64;
        group.bench_with_input(
            BenchmarkId::new("record_at_capacity", capacity),
            &capacity,
            |b, _| {
                b.iter(|| {
                    next += 1;
                    black_box(tracker.record(CorrelationKey::new(format!("new-{next}"))))
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// Round Trip
// ============================================================================

/// Delivers the reply through the ingestion endpoint as soon as the request
/// is dispatched.
struct LoopbackDispatcher {
    source: Arc<DirectReplySource>,
}

#[async_trait]
impl Dispatcher for LoopbackDispatcher {
    async fn dispatch(&self, request: Exchange) -> Result<Option<Exchange>, DispatchError> {
        let source = self.source.clone();
        tokio::spawn(async move {
            let reply = Exchange::reply_for(&request, json!("pong"));
            let _ = source.deliver(reply).await;
        });
        Ok(None)
    }
}

fn bench_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    let service = runtime.block_on(async {
        let source = Arc::new(DirectReplySource::new());
        RequestReplyService::builder(Arc::new(LoopbackDispatcher {
            source: source.clone(),
        }))
        .config(CorrelationConfig {
            monitor_poll_interval_ms: 50,
            ..CorrelationConfig::default()
        })
        .reply_source(source)
        .build()
        .expect("service")
    });

    let mut group = c.benchmark_group("request-reply");
    group.measurement_time(Duration::from_secs(10));

    let mut seq = 0u64;
    group.bench_function("loopback_round_trip", |b| {
        b.to_async(&runtime).iter(|| {
            seq += 1;
            let mut request = Exchange::new(format!("rt-{seq}"), json!("ping"));
            let service = &service;
            async move {
                black_box(
                    service
                        .request_reply(&mut request, ReplyTimeout::from_millis(5_000), None)
                        .await
                        .expect("reply"),
                )
            }
        })
    });

    group.finish();
    runtime.block_on(service.shutdown());
}

criterion_group!(
    benches,
    bench_wait_registry,
    bench_tracker_eviction,
    bench_round_trip
);
criterion_main!(benches);
