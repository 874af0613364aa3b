//! Prometheus metrics for the reply correlation engine.
//!
//! All metrics follow the naming convention: `rc_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., rc_requests_total)
//! - **Gauge**: Value that can go up or down (e.g., rc_pending_waits)
//! - **Histogram**: Distribution of values (e.g., rc_reply_latency_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // REQUESTER
    // =========================================================================

    /// Requests by terminal outcome
    pub static ref REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("rc_requests_total", "Request/reply exchanges by outcome"),
        &["outcome"]  // matched / timed_out / interrupted / pass_through / dispatch_failed
    ).expect("metric creation failed");

    /// Waits currently registered
    pub static ref PENDING_WAITS: Gauge = Gauge::new(
        "rc_pending_waits",
        "Requests currently blocked waiting for a reply"
    ).expect("metric creation failed");

    /// Time from dispatch to matched reply
    pub static ref REPLY_LATENCY: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "rc_reply_latency_seconds",
            "Time between dispatching a request and receiving its reply"
        ).buckets(exponential_buckets(0.0005, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // INGESTION & MONITOR
    // =========================================================================

    /// Replies written to the reply store
    pub static ref REPLIES_INGESTED: Counter = Counter::new(
        "rc_replies_ingested_total",
        "Replies accepted by the ingestion endpoint"
    ).expect("metric creation failed");

    /// Stray replies discarded because their key was already resolved
    pub static ref MISSED_REPLIES: Counter = Counter::new(
        "rc_missed_replies_total",
        "Late or duplicate replies discarded by the monitor"
    ).expect("metric creation failed");

    /// Unclaimed replies removed after their time-to-live
    pub static ref EXPIRED_REPLIES: Counter = Counter::new(
        "rc_expired_replies_total",
        "Stored replies nobody claimed within the unclaimed time-to-live"
    ).expect("metric creation failed");

    /// Duplicate resolutions detected (invariant violations)
    pub static ref DUPLICATE_RESOLUTIONS: Counter = Counter::new(
        "rc_duplicate_resolutions_total",
        "Replies that tried to resolve an already resolved wait"
    ).expect("metric creation failed");

    /// Monitor passes over the reply store
    pub static ref MONITOR_TICKS: Counter = Counter::new(
        "rc_monitor_ticks_total",
        "Correlation monitor scans"
    ).expect("metric creation failed");

    /// Monitor failures by stage
    pub static ref MONITOR_ERRORS: CounterVec = CounterVec::new(
        Opts::new("rc_monitor_errors_total", "Correlation monitor failures"),
        &["stage"]  // list / retrieve / remove / publish
    ).expect("metric creation failed");
}

/// Handle to the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Requester
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(PENDING_WAITS.clone()),
        Box::new(REPLY_LATENCY.clone()),
        // Ingestion & monitor
        Box::new(REPLIES_INGESTED.clone()),
        Box::new(MISSED_REPLIES.clone()),
        Box::new(EXPIRED_REPLIES.clone()),
        Box::new(DUPLICATE_RESOLUTIONS.clone()),
        Box::new(MONITOR_TICKS.clone()),
        Box::new(MONITOR_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }

    /// Record the elapsed time now instead of on drop.
    pub fn observe(self) {
        drop(self);
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
