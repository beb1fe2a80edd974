//! Renders core replies as Telegram messages.
//!
//! A reply is flattened into a short plan first: text segments are merged,
//! the first image carries the text as its caption when it fits, other images
//! follow as photos and local clips go out as videos.

use crate::config::{TELEGRAM_CAPTION_LIMIT, TELEGRAM_MESSAGE_LIMIT, TELEGRAM_UPLOAD_LIMIT};
use async_trait::async_trait;
use bililink_core::utils::split_long_message;
use bililink_core::{Reply, ReplyTransport, Segment};
use std::path::PathBuf;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, InputFile};
use tracing::{debug, warn};

/// One Telegram API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Plain text message
    Text(String),
    /// Photo by URL, optionally captioned
    Photo {
        /// Remote image URL
        url: String,
        /// Caption text
        caption: Option<String>,
    },
    /// Local video file
    Video(PathBuf),
}

/// Flatten a reply into the messages that will be sent, in order
#[must_use]
pub fn plan(reply: &Reply) -> Vec<Outgoing> {
    let text = reply.joined_text();
    let text = text.trim();
    let mut images = Vec::new();
    let mut videos = Vec::new();
    for segment in reply.segments() {
        match segment {
            Segment::Image(url) => images.push(url.clone()),
            Segment::Video(path) => videos.push(Outgoing::Video(path.clone())),
            Segment::Text(_) => {}
        }
    }

    let mut out = Vec::new();
    let mut images = images.into_iter();
    let captioned = !text.is_empty() && text.chars().count() <= TELEGRAM_CAPTION_LIMIT;
    if captioned {
        if let Some(url) = images.next() {
            out.push(Outgoing::Photo {
                url,
                caption: Some(text.to_string()),
            });
        }
    }
    if out.is_empty() && !text.is_empty() {
        out.extend(
            split_long_message(text, TELEGRAM_MESSAGE_LIMIT)
                .into_iter()
                .map(Outgoing::Text),
        );
    }
    out.extend(images.map(|url| Outgoing::Photo { url, caption: None }));
    out.extend(videos);
    out
}

/// Reject clips the Bot API would refuse anyway
///
/// # Errors
///
/// Returns an error naming the clip size when it exceeds [`TELEGRAM_UPLOAD_LIMIT`].
pub fn check_upload_size(bytes: u64) -> anyhow::Result<()> {
    if bytes > TELEGRAM_UPLOAD_LIMIT {
        anyhow::bail!(
            "clip is {:.1}MB, over the {}MB Telegram upload limit",
            megabytes(bytes),
            TELEGRAM_UPLOAD_LIMIT / (1024 * 1024)
        );
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Sends replies into one chat
#[derive(Clone)]
pub struct TelegramReplyTransport {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramReplyTransport {
    /// Transport bound to `chat_id`
    #[must_use]
    pub const fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    async fn send_photo(&self, url: &str, caption: Option<String>) -> anyhow::Result<()> {
        let sent = match url.parse() {
            Ok(parsed) => {
                let mut request = self.bot.send_photo(self.chat_id, InputFile::url(parsed));
                if let Some(caption) = caption.clone() {
                    request = request.caption(caption);
                }
                request.await.map(|_| ()).map_err(anyhow::Error::from)
            }
            Err(e) => Err(anyhow::anyhow!("bad image url {url}: {e}")),
        };

        // The caption still has to reach the chat when the image cannot
        if let Err(e) = sent {
            warn!(url = %url, error = %e, "Failed to send photo");
            if let Some(caption) = caption {
                self.bot.send_message(self.chat_id, caption).await?;
            }
        }
        Ok(())
    }

    async fn send_video(&self, path: PathBuf) -> anyhow::Result<()> {
        let size = tokio::fs::metadata(&path).await?.len();
        check_upload_size(size)?;
        let _ = self
            .bot
            .send_chat_action(self.chat_id, ChatAction::UploadVideo)
            .await;
        match self
            .bot
            .send_video(self.chat_id, InputFile::file(path.clone()))
            .supports_streaming(true)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to send video as native media; falling back to document"
                );
                self.bot
                    .send_document(self.chat_id, InputFile::file(path))
                    .await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ReplyTransport for TelegramReplyTransport {
    async fn send(&self, reply: Reply) -> anyhow::Result<()> {
        let steps = plan(&reply);
        debug!(chat_id = %self.chat_id, steps = steps.len(), "Sending reply");
        for step in steps {
            match step {
                Outgoing::Text(text) => {
                    self.bot.send_message(self.chat_id, text).await?;
                }
                Outgoing::Photo { url, caption } => self.send_photo(&url, caption).await?,
                Outgoing::Video(path) => self.send_video(path).await?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(url: &str, caption: Option<&str>) -> Outgoing {
        Outgoing::Photo {
            url: url.to_string(),
            caption: caption.map(str::to_string),
        }
    }

    #[test]
    fn first_image_carries_merged_text() {
        let mut reply = Reply::new();
        reply.push(Segment::Image("https://i0.hdslb.com/a.jpg".into()));
        reply.push_text("标题: 测试\n");
        reply.push_text("网址: https://www.bilibili.com/video/BV1");
        reply.push(Segment::Image("https://i0.hdslb.com/b.jpg".into()));

        assert_eq!(
            plan(&reply),
            vec![
                photo(
                    "https://i0.hdslb.com/a.jpg",
                    Some("标题: 测试\n网址: https://www.bilibili.com/video/BV1")
                ),
                photo("https://i0.hdslb.com/b.jpg", None),
            ]
        );
    }

    #[test]
    fn long_text_goes_out_separately() {
        let mut reply = Reply::new();
        reply.push(Segment::Image("https://i0.hdslb.com/a.jpg".into()));
        reply.push_text("字".repeat(TELEGRAM_CAPTION_LIMIT + 1));

        let steps = plan(&reply);
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], Outgoing::Text(t) if t.chars().count() == TELEGRAM_CAPTION_LIMIT + 1));
        assert_eq!(steps[1], photo("https://i0.hdslb.com/a.jpg", None));
    }

    #[test]
    fn oversized_text_is_split() {
        let reply = Reply::text("a\n".repeat(TELEGRAM_MESSAGE_LIMIT));
        let steps = plan(&reply);
        assert!(steps.len() > 1);
        assert!(steps
            .iter()
            .all(|s| matches!(s, Outgoing::Text(t) if t.chars().count() <= TELEGRAM_MESSAGE_LIMIT)));
    }

    #[test]
    fn video_only_reply() {
        let reply = Reply(vec![Segment::Video(PathBuf::from("/cache/1-20240101.mp4"))]);
        assert_eq!(
            plan(&reply),
            vec![Outgoing::Video(PathBuf::from("/cache/1-20240101.mp4"))]
        );
    }

    #[test]
    fn empty_reply_sends_nothing() {
        assert!(plan(&Reply::new()).is_empty());
        assert!(plan(&Reply::text("  ")).is_empty());
    }

    #[test]
    fn clips_over_upload_limit_are_rejected() {
        assert!(check_upload_size(0).is_ok());
        assert!(check_upload_size(TELEGRAM_UPLOAD_LIMIT).is_ok());

        let err = check_upload_size(80 * 1024 * 1024).expect_err("too large");
        assert_eq!(
            err.to_string(),
            "clip is 80.0MB, over the 50MB Telegram upload limit"
        );
    }
}
