//! Day-scoped clip cache on disk
//!
//! A clip is identified by `(content id, calendar day)` and stored as
//! `<dir>/<content_id>-<YYYYMMDD>.mp4`. A file present at that path is served
//! as is. Misses for the same key are single-flight: the first caller
//! transcodes into a unique `*.part.mp4` file and renames it into place, later
//! callers wait and then find the finished file.

use super::transcoder::{TranscodeJob, Transcoder};
use super::DownloadError;
use crate::config::{BILIBILI_REFERER, USER_AGENT};
use crate::keyed_lock::KeyedLocks;
use crate::limit::LimitPolicy;
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a cached clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Content id (`cid`) of the video stream
    pub content_id: i64,
    /// Local calendar day the clip belongs to
    pub day: NaiveDate,
}

impl CacheKey {
    /// Key for `content_id` on the current local day
    #[must_use]
    pub fn today(content_id: i64) -> Self {
        Self {
            content_id,
            day: Local::now().date_naive(),
        }
    }

    /// File name of the finished clip
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}-{}.mp4", self.content_id, self.day.format("%Y%m%d"))
    }
}

/// Where a missing clip is cut from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSource {
    /// Signed source stream URL
    pub url: String,
    /// Cap to apply
    pub limit: LimitPolicy,
}

fn is_clip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
}

/// Clip cache backed by a directory and a [`Transcoder`]
pub struct MediaCache {
    dir: PathBuf,
    transcoder: Arc<dyn Transcoder>,
    locks: KeyedLocks<CacheKey>,
}

impl MediaCache {
    /// Cache in `dir` filled by `transcoder`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            dir: dir.into(),
            transcoder,
            locks: KeyedLocks::new(),
        }
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory. With `purge`, clips left from earlier runs
    /// (finished and partial `.mp4` files) are deleted; anything else in the
    /// directory is kept, so it may be shared with the data directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or cleared.
    pub async fn prepare(&self, purge: bool) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        if !purge {
            return Ok(());
        }
        let mut removed = 0_usize;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !is_clip(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        info!(dir = %self.dir.display(), removed, "Media cache purged");
        Ok(())
    }

    /// Path a clip is (or would be) stored at
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Finished clip for `key`, if present
    pub async fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    /// Serve the clip for `key`, cutting it on a miss.
    ///
    /// `source` runs only on a miss, under the key's lock, so concurrent
    /// callers for one key fetch and transcode once.
    ///
    /// # Errors
    ///
    /// Returns the error of `source` or of the transcode step.
    pub async fn get_or_transcode<F, Fut>(
        &self,
        key: &CacheKey,
        source: F,
    ) -> Result<PathBuf, DownloadError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<ClipSource, DownloadError>> + Send,
    {
        let _guard = self.locks.lock(key).await;

        if let Some(path) = self.lookup(key).await {
            debug!(content_id = key.content_id, "Media cache hit");
            return Ok(path);
        }

        let clip = source().await?;
        let target = self.path_for(key);
        let partial = self.dir.join(format!(
            "{}-{}.{}.part.mp4",
            key.content_id,
            key.day.format("%Y%m%d"),
            uuid::Uuid::new_v4().simple()
        ));

        let job = TranscodeJob {
            input_url: clip.url,
            output: partial.clone(),
            start_offset: 0,
            limit: clip.limit,
            headers: vec![
                ("User-Agent".to_string(), USER_AGENT.to_string()),
                ("Referer".to_string(), BILIBILI_REFERER.to_string()),
            ],
        };

        info!(content_id = key.content_id, limit = ?clip.limit, "Media cache miss, transcoding");
        if let Err(e) = self.transcoder.transcode(&job).await {
            remove_partial(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            remove_partial(&partial).await;
            return Err(e.into());
        }
        Ok(target)
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Cannot remove partial clip");
        }
    }
}
