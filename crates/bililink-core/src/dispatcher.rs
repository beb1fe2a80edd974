//! Per-message orchestration of the link pipeline
//!
//! text -> classifier -> rate gate -> resolver -> (info + summary | download)
//! -> replies. Each step's failure is reported once to the conversation as an
//! `ERROR:` reply; nothing is retried.

use crate::bilibili::models::VideoCard;
use crate::bilibili::{self, render, BiliClient, ContentSource};
use crate::commands::{self, format_policy, AdminCommand};
use crate::config::{CoreSettings, RATE_LIMIT_MAX_KEYS};
use crate::conversation::{ConversationConfig, ConversationKey};
use crate::limit::{LimitPolicy, LimitPolicyStore};
use crate::link::{self, LinkKind, LinkMatch, RedirectResolver};
use crate::media::cache::MediaCache;
use crate::media::transcoder::{FfmpegTranscoder, Transcoder};
use crate::media::DownloadManager;
use crate::ratelimit::RateLimiter;
use crate::reply::{error_text, Reply, ReplyTransport, Segment};
use crate::session::{CookieFileSession, SessionProvider, StaticSession};
use crate::storage::{ConfigBackend, ConversationConfigStore, JsonFileBackend, StorageError};
use crate::summary;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A chat message as seen by the pipeline
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Conversation the message belongs to
    pub key: ConversationKey,
    /// Message text (or caption)
    pub text: String,
    /// The bot was addressed directly; bypasses the rate limiter
    pub addressed: bool,
}

/// External collaborators the dispatcher is assembled from
pub struct Collaborators {
    /// Short link expander
    pub resolver: Arc<dyn RedirectResolver>,
    /// Content metadata source
    pub source: Arc<dyn ContentSource>,
    /// Session cookie provider
    pub session: Arc<dyn SessionProvider>,
    /// Conversation config persistence
    pub backend: Arc<dyn ConfigBackend>,
    /// Global limit policy file
    pub limits: Arc<LimitPolicyStore>,
    /// Clip cache
    pub cache: MediaCache,
    /// Ambient trigger limiter
    pub limiter: RateLimiter,
}

/// Routes incoming messages through the link pipeline
pub struct LinkDispatcher {
    resolver: Arc<dyn RedirectResolver>,
    source: Arc<dyn ContentSource>,
    session: Arc<dyn SessionProvider>,
    configs: ConversationConfigStore,
    limits: Arc<LimitPolicyStore>,
    limiter: RateLimiter,
    downloads: DownloadManager,
}

impl LinkDispatcher {
    /// Assemble from explicit collaborators
    #[must_use]
    pub fn new(parts: Collaborators) -> Self {
        let downloads = DownloadManager::new(
            Arc::clone(&parts.source),
            Arc::clone(&parts.session),
            Arc::clone(&parts.limits),
            parts.cache,
        );
        Self {
            resolver: parts.resolver,
            source: parts.source,
            session: parts.session,
            configs: ConversationConfigStore::new(parts.backend),
            limits: parts.limits,
            limiter: parts.limiter,
            downloads,
        }
    }

    /// Build the production pipeline from settings.
    ///
    /// Opens the conversation store, prepares (and optionally purges) the
    /// clip cache, and wires the HTTP client and ffmpeg.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores, the cache directory, or the HTTP
    /// client cannot be set up.
    pub async fn from_settings(settings: &CoreSettings) -> anyhow::Result<Self> {
        let client = Arc::new(BiliClient::new(settings).context("building HTTP client")?);
        let session: Arc<dyn SessionProvider> = match settings.bilibili_cookie.as_deref() {
            Some(cookie) if !cookie.trim().is_empty() => Arc::new(StaticSession::new(cookie)),
            _ => Arc::new(CookieFileSession::new(&settings.cookie_file)),
        };
        let backend = JsonFileBackend::open(settings.conversation_store_path())
            .await
            .context("opening conversation store")?;

        let transcoder: Arc<dyn Transcoder> =
            Arc::new(FfmpegTranscoder::new(settings.ffmpeg_path.clone()));
        let cache = MediaCache::new(settings.cache_dir(), transcoder);
        cache
            .prepare(settings.purge_cache_on_start)
            .await
            .with_context(|| format!("preparing cache dir {}", settings.cache_dir().display()))?;

        info!(
            cache_dir = %settings.cache_dir().display(),
            data_dir = %settings.data_dir.display(),
            "Link pipeline ready"
        );

        Ok(Self::new(Collaborators {
            resolver: client.clone(),
            source: client,
            session,
            backend: Arc::new(backend),
            limits: Arc::new(LimitPolicyStore::new(settings.limit_policy_path())),
            cache,
            limiter: RateLimiter::new(settings.rate_limit_window(), RATE_LIMIT_MAX_KEYS),
        }))
    }

    /// Apply an admin command and return the confirmation or error reply.
    pub async fn execute_command(&self, key: ConversationKey, command: AdminCommand) -> Reply {
        match commands::execute(command, key, &self.configs, &self.limits).await {
            Ok(text) => Reply::text(text),
            Err(e) => {
                warn!(conversation = %key, error = %e, "Admin command failed");
                Reply::error(&e)
            }
        }
    }

    /// Current config of a conversation and the cap a download would use
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation store cannot be read.
    pub async fn status(&self, key: ConversationKey) -> Result<String, StorageError> {
        let config = self.configs.get(key).await?;
        let policy = LimitPolicy::effective(config.limit_mode, self.limits.load().await);
        let flag = |on: bool| if on { "开启" } else { "关闭" };
        Ok(format!(
            "视频信息: {}\n视频总结: {}\n视频上传: {}\n下载限制: {}",
            flag(config.info_enabled),
            flag(config.summary_enabled),
            flag(config.download_enabled),
            format_policy(&policy),
        ))
    }

    /// Run the link pipeline for one message.
    ///
    /// Returns `false` when the message was ignored: no link, dropped by the
    /// rate limiter, or a short link that led nowhere recognizable.
    pub async fn handle_links(
        &self,
        msg: &IncomingMessage,
        transport: &dyn ReplyTransport,
    ) -> bool {
        // Plain chatter must not consume the conversation's window
        if !link::contains_link(&msg.text) {
            return false;
        }
        if !self.limiter.admit(msg.key, msg.addressed).await {
            return false;
        }

        let matched = match link::classify(&msg.text, self.resolver.as_ref()).await {
            Ok(Some(matched)) => matched,
            Ok(None) => return false,
            Err(e) => {
                deliver(transport, msg.key, Reply::error(&e)).await;
                return true;
            }
        };
        info!(conversation = %msg.key, kind = %matched.kind, id = matched.id(), "Link matched");

        match matched.kind {
            LinkKind::Video => self.handle_video(msg.key, &matched, transport).await,
            _ => self.handle_single_shot(msg.key, &matched, transport).await,
        }
        true
    }

    async fn handle_single_shot(
        &self,
        key: ConversationKey,
        matched: &LinkMatch,
        transport: &dyn ReplyTransport,
    ) {
        let reply = match bilibili::resolve(self.source.as_ref(), self.session.as_ref(), matched)
            .await
        {
            Ok(record) => record.render(matched.id()),
            Err(e) => Reply::error(&e),
        };
        deliver(transport, key, reply).await;
    }

    async fn handle_video(
        &self,
        key: ConversationKey,
        matched: &LinkMatch,
        transport: &dyn ReplyTransport,
    ) {
        let video = match self.source.video_info(matched.id()).await {
            Ok(video) => video,
            Err(e) => {
                deliver(transport, key, Reply::error(&e)).await;
                return;
            }
        };
        let config = match self.configs.get(key).await {
            Ok(config) => config,
            Err(e) => {
                deliver(transport, key, Reply::error(&e)).await;
                return;
            }
        };
        debug!(conversation = %key, ?config, bvid = %video.bvid, "Video resolved");

        tokio::join!(
            self.send_video_info(key, &video, &config, transport),
            self.send_video_clip(key, &video, &config, transport),
        );
    }

    async fn send_video_info(
        &self,
        key: ConversationKey,
        video: &VideoCard,
        config: &ConversationConfig,
        transport: &dyn ReplyTransport,
    ) {
        if !config.info_enabled {
            return;
        }
        let mut reply = render::video_reply(video);
        if config.summary_enabled {
            match summary::summarize(self.source.as_ref(), self.session.as_ref(), video).await {
                Ok(summary) => reply.extend(summary),
                Err(e) => reply.push_text(error_text(&e)),
            }
        }
        deliver(transport, key, reply).await;
    }

    async fn send_video_clip(
        &self,
        key: ConversationKey,
        video: &VideoCard,
        config: &ConversationConfig,
        transport: &dyn ReplyTransport,
    ) {
        if !config.download_enabled {
            return;
        }
        let reply = match self.downloads.download(video, config.limit_mode).await {
            Ok(path) => Reply(vec![Segment::Video(path)]),
            Err(e) => {
                warn!(conversation = %key, bvid = %video.bvid, error = %e, "Clip download failed");
                Reply::error(&e)
            }
        };
        deliver(transport, key, reply).await;
    }
}

async fn deliver(transport: &dyn ReplyTransport, key: ConversationKey, reply: Reply) {
    if reply.is_empty() {
        return;
    }
    let Err(e) = transport.send(reply).await else {
        return;
    };
    warn!(conversation = %key, error = %e, "Failed to deliver reply");
    // One attempt to tell the chat; a failure here is only logged
    if let Err(e) = transport.send(Reply::error(&e)).await {
        warn!(conversation = %key, error = %e, "Failed to report delivery error");
    }
}
