//! Registry of requests blocked waiting for a reply.

use crate::domain::gate::ReplyGate;
use crate::domain::key::CorrelationKey;
use correlation_telemetry::PENDING_WAITS;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// A registered wait.
#[derive(Debug, Clone)]
pub struct PendingWait {
    pub key: CorrelationKey,
    pub gate: Arc<ReplyGate>,
    pub created_at: Instant,
}

impl PendingWait {
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Concurrent map from correlation key to the gate of the waiting request.
///
/// At most one wait per key. Whoever removes an entry through
/// [`WaitRegistry::claim`] owns its resolution.
#[derive(Debug, Default)]
pub struct WaitRegistry {
    waits: DashMap<CorrelationKey, PendingWait>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new wait for `key`.
    ///
    /// Returns the existing key back as the error if a wait is already
    /// registered for it.
    pub fn register(&self, key: CorrelationKey) -> Result<Arc<ReplyGate>, CorrelationKey> {
        match self.waits.entry(key) {
            Entry::Occupied(entry) => Err(entry.key().clone()),
            Entry::Vacant(entry) => {
                let gate = Arc::new(ReplyGate::new());
                let wait = PendingWait {
                    key: entry.key().clone(),
                    gate: gate.clone(),
                    created_at: Instant::now(),
                };
                entry.insert(wait);
                PENDING_WAITS.inc();
                Ok(gate)
            }
        }
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.waits.contains_key(key)
    }

    /// Remove the wait for `key`. Only one caller can win.
    pub fn claim(&self, key: &CorrelationKey) -> Option<PendingWait> {
        let removed = self.waits.remove(key).map(|(_, wait)| wait);
        if removed.is_some() {
            PENDING_WAITS.dec();
        }
        removed
    }

    /// Remove the wait for `key` only if it is still the one holding `gate`.
    ///
    /// Used by the owning request so it never removes a newer wait that
    /// re-registered the same key.
    pub fn claim_own(&self, key: &CorrelationKey, gate: &Arc<ReplyGate>) -> Option<PendingWait> {
        let removed = self
            .waits
            .remove_if(key, |_, wait| Arc::ptr_eq(&wait.gate, gate))
            .map(|(_, wait)| wait);
        if removed.is_some() {
            PENDING_WAITS.dec();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.waits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    pub fn keys(&self) -> Vec<CorrelationKey> {
        self.waits.iter().map(|entry| entry.key().clone()).collect()
    }
}
