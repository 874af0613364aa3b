//! Disk-backed reply store.
//!
//! One JSON file per correlation key in a single directory. File names are
//! the hex-encoded key, so arbitrary key strings are safe on any
//! filesystem. Hex doubles the length, so keys are limited to
//! [`MAX_KEY_BYTES`] to keep names under the common 255-byte limit. Writes go to a temp file in the same directory and are
//! renamed into place, so a reader in another process never sees a
//! partial snapshot.

use crate::domain::error::StoreError;
use crate::domain::key::CorrelationKey;
use crate::ports::outbound::{ReplyStore, StoredReply};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const REPLY_SUFFIX: &str = ".reply.json";

/// Longest key, in bytes, this store can name a file after.
pub const MAX_KEY_BYTES: usize = 120;

/// Reply store persisting snapshots as files.
#[derive(Debug)]
pub struct FileReplyStore {
    dir: PathBuf,
    disposed: AtomicBool,
}

impl FileReplyStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(component = "file_store", dir = %dir.display(), "Reply store opened");
        Ok(Self {
            dir,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CorrelationKey) -> Result<PathBuf, StoreError> {
        let len = key.as_str().len();
        if len > MAX_KEY_BYTES {
            return Err(StoreError::KeyTooLong {
                key: key.clone(),
                len,
                max: MAX_KEY_BYTES,
            });
        }
        Ok(self
            .dir
            .join(format!("{}{}", hex::encode(key.as_str()), REPLY_SUFFIX)))
    }

    fn key_from_file_name(name: &str) -> Option<CorrelationKey> {
        let encoded = name.strip_suffix(REPLY_SUFFIX)?;
        let bytes = hex::decode(encoded).ok()?;
        String::from_utf8(bytes).ok().map(CorrelationKey::from)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyStore for FileReplyStore {
    async fn store(&self, reply: StoredReply) -> Result<(), StoreError> {
        self.check_open()?;
        let bytes = serde_json::to_vec(&reply)?;
        let dir = self.dir.clone();
        let path = self.path_for(&reply.key)?;

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn retrieve(&self, key: &CorrelationKey) -> Result<StoredReply, StoreError> {
        self.check_open()?;
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &CorrelationKey) -> Result<(), StoreError> {
        self.check_open()?;
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<CorrelationKey>, StoreError> {
        self.check_open()?;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match Self::key_from_file_name(name) {
                Some(key) => keys.push(key),
                None if name.ends_with(REPLY_SUFFIX) => {
                    warn!(component = "file_store", file = name, "Skipping undecodable reply file");
                }
                None => {}
            }
        }
        Ok(keys)
    }

    async fn dispose(&self) -> Result<(), StoreError> {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(component = "file_store", dir = %self.dir.display(), "Reply store disposed");
        }
        Ok(())
    }
}
