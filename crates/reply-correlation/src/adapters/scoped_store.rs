//! Prefix-scoped view of a shared reply store.
//!
//! Several engines may share one backend, for example one `FileReplyStore`
//! directory. Each wraps it with its own prefix and only ever lists, claims
//! or deletes entries stored under that prefix. Keys are stored as
//! `"{prefix}/{key}"`.

use crate::domain::config::{check_store_prefix, ConfigError, STORE_PREFIX_SEPARATOR};
use crate::domain::error::StoreError;
use crate::domain::key::CorrelationKey;
use crate::ports::outbound::{ReplyStore, StoredReply};
use async_trait::async_trait;
use std::sync::Arc;

/// Reply store restricted to one namespace of an inner store.
pub struct ScopedReplyStore {
    inner: Arc<dyn ReplyStore>,
    prefix: String,
}

impl ScopedReplyStore {
    /// Scope `inner` to `prefix`. The prefix must be non-empty and must not
    /// contain `/`.
    pub fn new(inner: Arc<dyn ReplyStore>, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        check_store_prefix(&prefix)?;
        Ok(Self { inner, prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn scoped(&self, key: &CorrelationKey) -> CorrelationKey {
        CorrelationKey::new(format!("{}{}{}", self.prefix, STORE_PREFIX_SEPARATOR, key))
    }

    fn unscoped(&self, key: &CorrelationKey) -> Option<CorrelationKey> {
        let (prefix, rest) = key.as_str().split_once(STORE_PREFIX_SEPARATOR)?;
        (prefix == self.prefix).then(|| CorrelationKey::from(rest))
    }
}

#[async_trait]
impl ReplyStore for ScopedReplyStore {
    async fn store(&self, mut reply: StoredReply) -> Result<(), StoreError> {
        reply.key = self.scoped(&reply.key);
        self.inner.store(reply).await
    }

    async fn retrieve(&self, key: &CorrelationKey) -> Result<StoredReply, StoreError> {
        let mut stored = self
            .inner
            .retrieve(&self.scoped(key))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => StoreError::NotFound(key.clone()),
                other => other,
            })?;
        stored.key = key.clone();
        Ok(stored)
    }

    async fn remove(&self, key: &CorrelationKey) -> Result<(), StoreError> {
        self.inner.remove(&self.scoped(key)).await
    }

    async fn list_keys(&self) -> Result<Vec<CorrelationKey>, StoreError> {
        Ok(self
            .inner
            .list_keys()
            .await?
            .iter()
            .filter_map(|key| self.unscoped(key))
            .collect())
    }

    async fn dispose(&self) -> Result<(), StoreError> {
        self.inner.dispose().await
    }
}
