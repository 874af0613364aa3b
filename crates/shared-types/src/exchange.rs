//! # Exchange
//!
//! The unit of work that flows through a request/reply pipeline.
//!
//! ## Correlation
//!
//! - Requests and replies share a `correlation_id` (plus an optional
//!   `correlation_sequence` when one logical request is split into parts).
//! - Requests expecting an asynchronous reply carry a `reply_to` route so the
//!   responder knows where to answer.

use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a single exchange instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing information for the reply to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRoute {
    /// Address (topic, queue, endpoint name) the reply must be sent to.
    pub address: String,
    /// Token identifying the waiting request; echoed back untouched.
    pub token: String,
}

/// A request or reply travelling through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Identity of this particular exchange.
    pub id: ExchangeId,

    /// Identifier shared by a request and all of its replies.
    pub correlation_id: String,

    /// Position of this exchange within a split request, if any.
    pub correlation_sequence: Option<u32>,

    /// Opaque message body.
    pub payload: serde_json::Value,

    /// Transport-level headers.
    pub headers: BTreeMap<String, String>,

    /// Session properties carried alongside the payload.
    pub session: Session,

    /// Where the reply should be delivered. Set on outgoing requests only.
    pub reply_to: Option<ReplyRoute>,
}

impl Exchange {
    /// Create a new exchange with a fresh identity.
    pub fn new(correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: ExchangeId::new(),
            correlation_id: correlation_id.into(),
            correlation_sequence: None,
            payload,
            headers: BTreeMap::new(),
            session: Session::new(),
            reply_to: None,
        }
    }

    /// Create an exchange with a random correlation id.
    pub fn with_random_correlation(payload: serde_json::Value) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }

    /// Builder-style setter for the correlation sequence.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.correlation_sequence = Some(sequence);
        self
    }

    /// Builder-style setter for a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Build a reply to `request`.
    ///
    /// The reply copies correlation id and sequence so it resolves to the
    /// same correlation key. Session and headers start empty.
    pub fn reply_for(request: &Exchange, payload: serde_json::Value) -> Self {
        Self {
            id: ExchangeId::new(),
            correlation_id: request.correlation_id.clone(),
            correlation_sequence: request.correlation_sequence,
            payload,
            headers: BTreeMap::new(),
            session: Session::new(),
            reply_to: None,
        }
    }
}
