//! Domain layer: correlation keys, wait bookkeeping and configuration.

pub mod config;
pub mod error;
pub mod gate;
pub mod key;
pub mod registry;
pub mod stats;
pub mod tracker;

pub use config::{
    ConfigError, CorrelationConfig, ReplyTimeout, UnmatchedReplyPolicy, DEFAULT_UNCLAIMED_TTL_MS,
    STORE_PREFIX_SEPARATOR,
};
pub use error::{CorrelationError, CorrelationResult, StoreError};
pub use gate::ReplyGate;
pub use key::{
    correlation_id_key_strategy, default_key_strategy, CorrelationKey, KeyStrategy,
    SEQUENCE_NOT_SET,
};
pub use registry::{PendingWait, WaitRegistry};
pub use stats::{CorrelationStats, StatsSnapshot};
pub use tracker::{RecentlyResolvedTracker, DEFAULT_RECENTLY_RESOLVED_CAPACITY};
