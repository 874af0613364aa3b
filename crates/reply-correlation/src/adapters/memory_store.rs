//! In-memory reply store.

use crate::domain::error::StoreError;
use crate::domain::key::CorrelationKey;
use crate::ports::outbound::{ReplyStore, StoredReply};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reply store backed by a concurrent map.
///
/// Replies only cross tasks of the same process. Use `FileReplyStore` when
/// the reply may be received by another process.
#[derive(Debug, Default)]
pub struct InMemoryReplyStore {
    replies: DashMap<CorrelationKey, StoredReply>,
    disposed: AtomicBool,
}

impl InMemoryReplyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyStore for InMemoryReplyStore {
    async fn store(&self, reply: StoredReply) -> Result<(), StoreError> {
        self.check_open()?;
        self.replies.insert(reply.key.clone(), reply);
        Ok(())
    }

    async fn retrieve(&self, key: &CorrelationKey) -> Result<StoredReply, StoreError> {
        self.check_open()?;
        self.replies
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn remove(&self, key: &CorrelationKey) -> Result<(), StoreError> {
        self.check_open()?;
        self.replies.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<CorrelationKey>, StoreError> {
        self.check_open()?;
        Ok(self.replies.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn dispose(&self) -> Result<(), StoreError> {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.replies.clear();
        }
        Ok(())
    }
}
