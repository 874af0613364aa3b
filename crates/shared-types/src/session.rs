//! # Session State
//!
//! Side-channel properties that travel with an exchange. A responder may set
//! properties on the reply's session; the requester merges them back into the
//! original request when the reply is matched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed session properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    properties: BTreeMap<String, serde_json::Value>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, returning the previous value if any.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<serde_json::Value> {
        self.properties.remove(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate over properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.properties.iter()
    }

    /// Merge `other` into this session.
    ///
    /// Properties present in `other` overwrite same-named properties here.
    /// Properties only present here are kept.
    pub fn merge_from(&mut self, other: &Session) {
        for (name, value) in &other.properties {
            self.properties.insert(name.clone(), value.clone());
        }
    }
}
