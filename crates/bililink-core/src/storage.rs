//! Storage layer for per-conversation config words
//!
//! The backend is a small key/value interface so the host can plug its own
//! persistence. A JSON file backend is provided for standalone deployments.

use crate::conversation::{ConversationConfig, ConversationKey};
use crate::keyed_lock::KeyedLocks;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Integer config store keyed by conversation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Read the stored word, 0 when nothing has been stored yet
    async fn get(&self, key: i64) -> Result<i64, StorageError>;
    /// Replace the stored word
    async fn set(&self, key: i64, value: i64) -> Result<(), StorageError>;
}

/// Config backend persisted as a single JSON object on disk
pub struct JsonFileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<i64, i64>>,
}

impl JsonFileBackend {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing file starts an empty store. An unreadable file is logged and
    /// replaced on the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Conversation store is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), conversations = entries.len(), "Conversation store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigBackend for JsonFileBackend {
    async fn get(&self, key: i64) -> Result<i64, StorageError> {
        Ok(self.entries.lock().await.get(&key).copied().unwrap_or(0))
    }

    async fn set(&self, key: i64, value: i64) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key, value);
        let body = serde_json::to_vec_pretty(&*entries)?;
        if let Err(e) = write_atomic(&self.path, &body).await {
            // Keep memory consistent with disk
            match previous {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e.into());
        }
        Ok(())
    }
}

/// Write `body` to a sibling temp file and rename it over `path`
///
/// # Errors
///
/// Returns an I/O error if writing or renaming fails.
pub async fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&tmp, body).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Typed access to conversation configs with per-key serialized updates
pub struct ConversationConfigStore {
    backend: Arc<dyn ConfigBackend>,
    locks: KeyedLocks<i64>,
}

impl ConversationConfigStore {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn ConfigBackend>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
        }
    }

    /// Read and decode a conversation's config
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn get(&self, key: ConversationKey) -> Result<ConversationConfig, StorageError> {
        let bits = self.backend.get(key.as_i64()).await?;
        Ok(ConversationConfig::from_bits(bits))
    }

    /// Atomically modify a conversation's config using a closure.
    ///
    /// Concurrent updates to the same conversation are applied one after the
    /// other, so no toggle is lost.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or saving fails.
    pub async fn update<F>(
        &self,
        key: ConversationKey,
        modifier: F,
    ) -> Result<ConversationConfig, StorageError>
    where
        F: FnOnce(&mut ConversationConfig) + Send,
    {
        let _guard = self.locks.lock(&key.as_i64()).await;
        let mut config = self.get(key).await?;
        modifier(&mut config);
        self.backend.set(key.as_i64(), config.to_bits()).await?;
        debug!(conversation = %key, bits = config.to_bits(), "Conversation config updated");
        Ok(config)
    }
}
