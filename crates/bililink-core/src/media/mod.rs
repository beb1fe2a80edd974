//! Download cache manager: clip lookup, stream resolution and transcoding

pub mod cache;
pub mod transcoder;

use crate::bilibili::models::VideoCard;
use crate::bilibili::{ContentSource, ResolveError};
use crate::conversation::LimitMode;
use crate::limit::{LimitPolicy, LimitPolicyStore};
use crate::session::{SessionError, SessionProvider};
use cache::{CacheKey, ClipSource, MediaCache};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use transcoder::TranscodeError;

/// Errors from producing a clip
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Session cookie unavailable
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Stream URL could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Transcoder missing or failed
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    /// Cache directory failure
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves clips of videos, cutting them on cache misses
pub struct DownloadManager {
    source: Arc<dyn ContentSource>,
    session: Arc<dyn SessionProvider>,
    limits: Arc<LimitPolicyStore>,
    cache: MediaCache,
}

impl DownloadManager {
    /// Assemble a manager from its collaborators
    #[must_use]
    pub fn new(
        source: Arc<dyn ContentSource>,
        session: Arc<dyn SessionProvider>,
        limits: Arc<LimitPolicyStore>,
        cache: MediaCache,
    ) -> Self {
        Self {
            source,
            session,
            limits,
            cache,
        }
    }

    /// Underlying cache
    #[must_use]
    pub const fn cache(&self) -> &MediaCache {
        &self.cache
    }

    /// Local clip of `video` for today.
    ///
    /// On a miss the session cookie is loaded, the signed stream URL fetched,
    /// and the effective cap resolved from the conversation's mode and the
    /// stored policy (re-read on every miss).
    ///
    /// # Errors
    ///
    /// Returns session, resolve, transcode or cache I/O errors.
    pub async fn download(
        &self,
        video: &VideoCard,
        conversation_mode: Option<LimitMode>,
    ) -> Result<PathBuf, DownloadError> {
        let key = CacheKey::today(video.cid);
        self.cache
            .get_or_transcode(&key, move || async move {
                let cookie = self.session.load().await?;
                let url = self.source.video_stream_url(video, &cookie).await?;
                let limit = LimitPolicy::effective(conversation_mode, self.limits.load().await);
                debug!(bvid = %video.bvid, ?limit, "Clip source resolved");
                Ok(ClipSource { url, limit })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bilibili::MockContentSource;
    use crate::session::MockSessionProvider;
    use crate::testing::{sample_video, FakeTranscoder};

    struct Fixture {
        dir: tempfile::TempDir,
        transcoder: Arc<FakeTranscoder>,
        limits: Arc<LimitPolicyStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let limits = Arc::new(LimitPolicyStore::new(dir.path().join("video_limit.json")));
        Fixture {
            dir,
            transcoder: Arc::new(FakeTranscoder::new()),
            limits,
        }
    }

    fn manager(fx: &Fixture, source: MockContentSource, session: MockSessionProvider) -> DownloadManager {
        let cache = MediaCache::new(fx.dir.path().join("cache"), fx.transcoder.clone());
        DownloadManager::new(Arc::new(source), Arc::new(session), fx.limits.clone(), cache)
    }

    #[tokio::test]
    async fn cached_clip_skips_stream_lookup() {
        let fx = fixture();
        let mut source = MockContentSource::new();
        source
            .expect_video_stream_url()
            .times(1)
            .returning(|_, _| Ok("https://upos.example/v.mp4".into()));
        let mut session = MockSessionProvider::new();
        session.expect_load().times(1).returning(|| Ok("SESSDATA=x".into()));

        let manager = manager(&fx, source, session);
        manager.cache().prepare(true).await.expect("prepare");
        let video = sample_video();

        let a = manager.download(&video, None).await.expect("first");
        let b = manager.download(&video, None).await.expect("second");
        assert_eq!(a, b);
        assert_eq!(fx.transcoder.calls(), 1);
    }

    #[tokio::test]
    async fn conversation_mode_selects_policy() {
        let fx = fixture();
        fx.limits
            .save(LimitPolicy::megabytes(64))
            .await
            .expect("save");

        let mut source = MockContentSource::new();
        source
            .expect_video_stream_url()
            .returning(|_, _| Ok("https://upos.example/v.mp4".into()));
        let mut session = MockSessionProvider::new();
        session.expect_load().returning(|| Ok("c".into()));

        let manager = manager(&fx, source, session);
        manager.cache().prepare(true).await.expect("prepare");
        manager
            .download(&sample_video(), Some(LimitMode::Size))
            .await
            .expect("download");

        assert_eq!(
            fx.transcoder.jobs()[0].limit,
            LimitPolicy::megabytes(64)
        );
    }

    #[tokio::test]
    async fn missing_session_fails_before_transcoding() {
        let fx = fixture();
        let source = MockContentSource::new();
        let mut session = MockSessionProvider::new();
        session
            .expect_load()
            .returning(|| Err(SessionError::NotConfigured));

        let manager = manager(&fx, source, session);
        manager.cache().prepare(true).await.expect("prepare");
        let err = manager
            .download(&sample_video(), None)
            .await
            .expect_err("no cookie");
        assert!(matches!(err, DownloadError::Session(_)));
        assert_eq!(fx.transcoder.calls(), 0);
    }
}
