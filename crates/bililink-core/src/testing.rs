//! Testing helpers: fakes for the transcoder and transport, sample payloads.

use crate::bilibili::models::{Owner, VideoCard, VideoStat};
use crate::media::transcoder::{TranscodeError, TranscodeJob, Transcoder};
use crate::reply::{Reply, ReplyTransport, Segment};
use crate::session::MockSessionProvider;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transcoder double that counts invocations and writes a placeholder file.
#[derive(Default)]
pub struct FakeTranscoder {
    calls: AtomicUsize,
    jobs: Mutex<Vec<TranscodeJob>>,
    fail: bool,
}

impl FakeTranscoder {
    /// Succeeding transcoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcoder that leaves a partial file behind and then fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Number of `transcode` invocations
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Jobs received, in order
    pub fn jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.lock().expect("jobs lock").clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().expect("jobs lock").push(job.clone());
        // Give concurrent callers a chance to pile up
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&job.output, b"clip")
            .await
            .expect("write fake clip");
        if self.fail {
            return Err(TranscodeError::Failed {
                status: "exit status: 1".into(),
                stderr: "Server returned 403 Forbidden".into(),
            });
        }
        Ok(())
    }
}

/// Transport double that records every reply it delivers.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Reply>>,
    reject_video: bool,
}

impl RecordingTransport {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that refuses replies carrying a video, as Telegram does for
    /// uploads over its size limit
    #[must_use]
    pub fn rejecting_video() -> Self {
        Self {
            reject_video: true,
            ..Self::new()
        }
    }

    /// Replies sent so far
    pub fn sent(&self) -> Vec<Reply> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Joined text of every reply sent so far
    pub fn texts(&self) -> Vec<String> {
        self.sent().iter().map(Reply::joined_text).collect()
    }
}

#[async_trait]
impl ReplyTransport for RecordingTransport {
    async fn send(&self, reply: Reply) -> anyhow::Result<()> {
        let has_video = reply
            .segments()
            .iter()
            .any(|s| matches!(s, Segment::Video(_)));
        if self.reject_video && has_video {
            anyhow::bail!("Request Entity Too Large");
        }
        self.sent.lock().expect("sent lock").push(reply);
        Ok(())
    }
}

/// A plausible video payload
#[must_use]
pub fn sample_video() -> VideoCard {
    VideoCard {
        bvid: "BV1GJ411x7h7".into(),
        aid: 80_433_022,
        cid: 137_649_199,
        title: "【官方 MV】Never Gonna Give You Up".into(),
        pic: "https://i0.hdslb.com/bfs/archive/cover.jpg".into(),
        duration: 213,
        owner: Owner {
            mid: 486_906_719,
            name: "索尼音乐中国".into(),
        },
        stat: VideoStat {
            view: 78_000_000,
            like: 2_100_000,
            ..VideoStat::default()
        },
        ..VideoCard::default()
    }
}

/// Session provider that always yields `cookie`
#[must_use]
pub fn mock_session(cookie: &'static str) -> MockSessionProvider {
    let mut mock = MockSessionProvider::new();
    mock.expect_load().returning(move || Ok(cookie.to_string()));
    mock
}
