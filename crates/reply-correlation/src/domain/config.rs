//! Correlation engine configuration with validation.

use crate::domain::tracker::DEFAULT_RECENTLY_RESOLVED_CAPACITY;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How long a request waits for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTimeout {
    /// Wait until the reply arrives or the caller is interrupted.
    Infinite,
    /// Give up after the duration elapses.
    After(Duration),
}

impl ReplyTimeout {
    /// Millisecond form used by configuration: zero or negative means infinite.
    pub fn from_millis(timeout_ms: i64) -> Self {
        if timeout_ms <= 0 {
            ReplyTimeout::Infinite
        } else {
            ReplyTimeout::After(Duration::from_millis(timeout_ms.unsigned_abs()))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            ReplyTimeout::Infinite => None,
            ReplyTimeout::After(duration) => Some(*duration),
        }
    }

    /// Milliseconds reported in timeout errors and events (0 for infinite).
    pub fn as_millis(&self) -> u64 {
        self.duration()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl From<Duration> for ReplyTimeout {
    fn from(duration: Duration) -> Self {
        ReplyTimeout::After(duration)
    }
}

/// What the monitor does with a stored reply that has no waiting request
/// and was never resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedReplyPolicy {
    /// Leave it in the store; a wait may still be registered for it.
    #[default]
    Retain,
    /// Remove it from the store.
    Discard,
}

impl FromStr for UnmatchedReplyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(UnmatchedReplyPolicy::Retain),
            "discard" => Ok(UnmatchedReplyPolicy::Discard),
            other => Err(ConfigError::InvalidValue {
                name: "RC_UNMATCHED_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

/// Default lifetime of a stored reply that no request ever claims.
pub const DEFAULT_UNCLAIMED_TTL_MS: u64 = 300_000;

/// Main correlation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Default reply timeout in milliseconds; `<= 0` waits forever
    pub timeout_ms: i64,
    /// Return an error on timeout instead of an empty result
    pub fail_on_timeout: bool,
    /// Number of resolved keys remembered for late-reply detection
    pub recently_resolved_capacity: usize,
    /// Monitor scan period
    pub monitor_poll_interval_ms: u64,
    /// Extra time a timed-out request keeps waiting for an in-flight hand-off
    pub monitor_grace_period_ms: u64,
    /// Handling of stored replies nobody is waiting for
    pub unmatched_policy: UnmatchedReplyPolicy,
    /// Age after which a retained reply nobody claimed is deleted; 0 keeps it
    pub unclaimed_ttl_ms: u64,
    /// Namespace for this engine's entries in a shared reply store
    pub store_prefix: Option<String>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            fail_on_timeout: true,
            recently_resolved_capacity: DEFAULT_RECENTLY_RESOLVED_CAPACITY,
            monitor_poll_interval_ms: 100,
            monitor_grace_period_ms: 1_000,
            unmatched_policy: UnmatchedReplyPolicy::Retain,
            unclaimed_ttl_ms: DEFAULT_UNCLAIMED_TTL_MS,
            store_prefix: None,
        }
    }
}

impl CorrelationConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    ///
    /// - `RC_TIMEOUT_MS`: default reply timeout (default: 10000)
    /// - `RC_FAIL_ON_TIMEOUT`: error on timeout (default: true)
    /// - `RC_RECENT_CAPACITY`: recently resolved capacity (default: 50000)
    /// - `RC_POLL_INTERVAL_MS`: monitor scan period (default: 100)
    /// - `RC_GRACE_PERIOD_MS`: hand-off grace period (default: 1000)
    /// - `RC_UNMATCHED_POLICY`: `retain` or `discard` (default: retain)
    /// - `RC_UNCLAIMED_TTL_MS`: unclaimed reply lifetime, 0 = forever (default: 300000)
    /// - `RC_STORE_PREFIX`: reply store namespace (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            timeout_ms: env_parse("RC_TIMEOUT_MS", defaults.timeout_ms)?,
            fail_on_timeout: env_bool("RC_FAIL_ON_TIMEOUT", defaults.fail_on_timeout)?,
            recently_resolved_capacity: env_parse(
                "RC_RECENT_CAPACITY",
                defaults.recently_resolved_capacity,
            )?,
            monitor_poll_interval_ms: env_parse(
                "RC_POLL_INTERVAL_MS",
                defaults.monitor_poll_interval_ms,
            )?,
            monitor_grace_period_ms: env_parse(
                "RC_GRACE_PERIOD_MS",
                defaults.monitor_grace_period_ms,
            )?,
            unmatched_policy: match env::var("RC_UNMATCHED_POLICY") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.unmatched_policy,
            },
            unclaimed_ttl_ms: env_parse("RC_UNCLAIMED_TTL_MS", defaults.unclaimed_ttl_ms)?,
            store_prefix: env::var("RC_STORE_PREFIX").ok().or(defaults.store_prefix),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recently_resolved_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "recently_resolved_capacity cannot be 0".into(),
            ));
        }

        if self.monitor_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "monitor_poll_interval_ms cannot be 0".into(),
            ));
        }

        if let Some(prefix) = &self.store_prefix {
            check_store_prefix(prefix)?;
        }

        Ok(())
    }

    pub fn default_timeout(&self) -> ReplyTimeout {
        ReplyTimeout::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.monitor_grace_period_ms)
    }

    pub fn unclaimed_ttl(&self) -> Option<Duration> {
        (self.unclaimed_ttl_ms > 0).then(|| Duration::from_millis(self.unclaimed_ttl_ms))
    }
}

/// Separates a store prefix from the key it scopes.
pub const STORE_PREFIX_SEPARATOR: char = '/';

/// A prefix must be non-empty and free of the separator, so no prefix can
/// see another prefix's entries.
pub(crate) fn check_store_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.is_empty() || prefix.contains(STORE_PREFIX_SEPARATOR) {
        return Err(ConfigError::InvalidValue {
            name: "store_prefix",
            value: prefix.to_string(),
        });
    }
    Ok(())
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid polling interval
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Environment variable could not be parsed
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}
