//! Global download cap policy persisted as `video_limit.json`
//!
//! The file holds `{"type":"time"|"size","value":N}` where N is seconds for
//! time mode and megabytes for size mode.

use crate::config::{DEFAULT_SIZE_LIMIT_MB, DEFAULT_TIME_LIMIT_SECS};
use crate::conversation::LimitMode;
use crate::storage::{write_atomic, StorageError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A download cap: how clips are cut and at which value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Cap mode
    #[serde(rename = "type")]
    pub mode: LimitMode,
    /// Seconds for [`LimitMode::Time`], megabytes for [`LimitMode::Size`]
    pub value: u64,
}

impl LimitPolicy {
    /// Built-in default for a mode
    #[must_use]
    pub const fn default_for(mode: LimitMode) -> Self {
        let value = match mode {
            LimitMode::Time => DEFAULT_TIME_LIMIT_SECS,
            LimitMode::Size => DEFAULT_SIZE_LIMIT_MB,
        };
        Self { mode, value }
    }

    /// Duration cap in seconds
    #[must_use]
    pub const fn seconds(seconds: u64) -> Self {
        Self {
            mode: LimitMode::Time,
            value: seconds,
        }
    }

    /// Size cap in megabytes
    #[must_use]
    pub const fn megabytes(megabytes: u64) -> Self {
        Self {
            mode: LimitMode::Size,
            value: megabytes,
        }
    }

    /// Size cap converted to bytes, `None` for time policies
    #[must_use]
    pub const fn size_bytes(&self) -> Option<u64> {
        match self.mode {
            LimitMode::Size => Some(self.value.saturating_mul(1024 * 1024)),
            LimitMode::Time => None,
        }
    }

    /// Resolve the policy a download should use.
    ///
    /// The conversation's selected mode wins. Without one, the mode stored in
    /// the file is used, and without a file, time mode. The value comes from
    /// the file only when its mode matches, otherwise the built-in default.
    #[must_use]
    pub fn effective(conversation_mode: Option<LimitMode>, stored: Option<Self>) -> Self {
        let mode = conversation_mode
            .or_else(|| stored.map(|p| p.mode))
            .unwrap_or(LimitMode::Time);
        match stored {
            Some(policy) if policy.mode == mode => policy,
            _ => Self::default_for(mode),
        }
    }
}

/// File-backed holder of the single global [`LimitPolicy`]
pub struct LimitPolicyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LimitPolicyStore {
    /// Store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the policy file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored policy. A missing or malformed file yields `None`.
    pub async fn load(&self) -> Option<LimitPolicy> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read limit policy");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(policy) => Some(policy),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed limit policy, using defaults");
                None
            }
        }
    }

    /// Persist a new policy, replacing the file atomically
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub async fn save(&self, policy: LimitPolicy) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.write(policy).await
    }

    /// Persist `policy`, then run `follow_up` before any other writer may
    /// touch the file. Limit commands use this to keep a conversation's mode
    /// flag and the stored mode in step.
    ///
    /// # Errors
    ///
    /// Returns the write error, or whatever `follow_up` returns.
    pub async fn save_then<F, Fut, T, E>(
        &self,
        policy: LimitPolicy,
        follow_up: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        let _guard = self.write_lock.lock().await;
        self.write(policy).await?;
        follow_up().await
    }

    async fn write(&self, policy: LimitPolicy) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(&policy)?;
        write_atomic(&self.path, &body).await?;
        info!(mode = ?policy.mode, value = policy.value, "Limit policy saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_format_matches_wire_shape() {
        let json = serde_json::to_string(&LimitPolicy::seconds(120)).expect("serialize");
        assert_eq!(json, r#"{"type":"time","value":120}"#);

        let parsed: LimitPolicy =
            serde_json::from_str(r#"{"type":"size","value":2048}"#).expect("parse");
        assert_eq!(parsed, LimitPolicy::megabytes(2048));
    }

    #[test]
    fn effective_policy_resolution() {
        // Nothing configured anywhere
        assert_eq!(
            LimitPolicy::effective(None, None),
            LimitPolicy::seconds(DEFAULT_TIME_LIMIT_SECS)
        );
        // File decides the mode when the conversation has none
        assert_eq!(
            LimitPolicy::effective(None, Some(LimitPolicy::megabytes(50))),
            LimitPolicy::megabytes(50)
        );
        // Conversation mode differs from file: default value for that mode
        assert_eq!(
            LimitPolicy::effective(Some(LimitMode::Size), Some(LimitPolicy::seconds(60))),
            LimitPolicy::megabytes(DEFAULT_SIZE_LIMIT_MB)
        );
        assert_eq!(
            LimitPolicy::effective(Some(LimitMode::Time), Some(LimitPolicy::seconds(60))),
            LimitPolicy::seconds(60)
        );
    }

    #[test]
    fn size_bytes_only_for_size_mode() {
        assert_eq!(LimitPolicy::megabytes(2).size_bytes(), Some(2 * 1024 * 1024));
        assert_eq!(LimitPolicy::seconds(2).size_bytes(), None);
    }

    #[tokio::test]
    async fn store_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LimitPolicyStore::new(dir.path().join("video_limit.json"));
        assert_eq!(store.load().await, None);

        store
            .save(LimitPolicy::megabytes(300))
            .await
            .expect("save");
        assert_eq!(store.load().await, Some(LimitPolicy::megabytes(300)));

        store.save(LimitPolicy::seconds(90)).await.expect("save");
        assert_eq!(store.load().await, Some(LimitPolicy::seconds(90)));
    }

    #[tokio::test]
    async fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("video_limit.json");
        tokio::fs::write(&path, br#"{"type":"weight","value":1}"#)
            .await
            .expect("write");
        assert_eq!(LimitPolicyStore::new(path).load().await, None);
    }
}
