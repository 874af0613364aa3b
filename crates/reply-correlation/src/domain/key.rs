//! Correlation key derivation.
//!
//! A key identifies one in-flight request/reply pair. The default derivation
//! joins the exchange's correlation id with its sequence number, or with
//! [`SEQUENCE_NOT_SET`] when the exchange is not part of a split request.

use serde::{Deserialize, Serialize};
use shared_types::Exchange;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Sentinel used in place of a missing correlation sequence.
pub const SEQUENCE_NOT_SET: &str = "NOT_SET";

/// Key that ties a reply to the request waiting for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Default derivation: `"{correlation_id}-{sequence|NOT_SET}"`.
    pub fn for_exchange(exchange: &Exchange) -> Self {
        match exchange.correlation_sequence {
            Some(sequence) => Self(format!("{}-{}", exchange.correlation_id, sequence)),
            None => Self(format!("{}-{}", exchange.correlation_id, SEQUENCE_NOT_SET)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CorrelationKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CorrelationKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Strategy computing the correlation key of an exchange.
pub type KeyStrategy = Arc<dyn Fn(&Exchange) -> CorrelationKey + Send + Sync>;

/// The default strategy, [`CorrelationKey::for_exchange`].
pub fn default_key_strategy() -> KeyStrategy {
    Arc::new(CorrelationKey::for_exchange)
}

/// Strategy keying on the bare correlation id, ignoring sequence numbers.
pub fn correlation_id_key_strategy() -> KeyStrategy {
    Arc::new(|exchange: &Exchange| CorrelationKey::new(exchange.correlation_id.clone()))
}
