//! # Correlation Telemetry
//!
//! Logging and metrics for the reply correlation engine.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter`, pretty or JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms in a private registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use correlation_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // ... build and start the RequestReplyService
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RC_SERVICE_NAME` | `reply-correlation` | Service name in logs |
//! | `RC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `RC_JSON_LOGS` | `false` | JSON output (defaults on inside containers) |
//! | `RC_CONSOLE_OUTPUT` | `true` | Disable to keep only the filter |

mod config;
pub mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, DUPLICATE_RESOLUTIONS,
    EXPIRED_REPLIES, MISSED_REPLIES, MONITOR_ERRORS, MONITOR_TICKS, PENDING_WAITS,
    REPLIES_INGESTED, REPLY_LATENCY, REQUESTS_TOTAL,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first; they do not depend on the subscriber
    let metrics_handle = register_metrics()?;

    let tracing_guard = init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with component context.
///
/// # Example
///
/// ```rust,ignore
/// let _span = component_span!("request_reply", component = "requester", correlation_key = %key);
/// ```
#[macro_export]
macro_rules! component_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
