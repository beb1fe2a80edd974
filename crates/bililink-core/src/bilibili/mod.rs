//! Bilibili web API client (content resolver)
//!
//! Every content kind maps to one endpoint. Responses share the
//! `{code, message, data}` envelope; a non-zero code is surfaced as
//! [`ResolveError::Api`]. Nothing is retried.

pub mod models;
pub mod render;
pub mod wbi;

use crate::config::{CoreSettings, USER_AGENT, WBI_KEY_TTL_SECS};
use crate::link::{LinkKind, LinkMatch, RedirectResolver};
use crate::reply::Reply;
use crate::session::{SessionError, SessionProvider};
use async_trait::async_trait;
use models::{
    ApiEnvelope, ArticleCard, DynamicDetail, LiveCard, NavData, PlayUrlData, SummaryData,
    VideoCard,
};
use moka::future::Cache;
use reqwest::header::{COOKIE, LOCATION};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from resolving links and fetching content
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
    /// The API answered with a non-zero code
    #[error("bilibili API error {code}: {message}")]
    Api {
        /// API code
        code: i64,
        /// API message
        message: String,
    },
    /// Envelope without payload
    #[error("bilibili API returned no data")]
    MissingData,
    /// Payload did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Short link could not be expanded
    #[error("redirect failed: {0}")]
    Redirect(String),
    /// Play URL response listed no stream
    #[error("no playable stream for this video")]
    NoStream,
    /// Session cookie unavailable
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Fetches content metadata by kind and id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Video metadata by `BV` id or numeric `av` id
    async fn video_info(&self, id: &str) -> Result<VideoCard, ResolveError>;
    /// Article metadata by numeric id
    async fn article_info(&self, id: &str) -> Result<ArticleCard, ResolveError>;
    /// Feed post; the cookie is optional
    async fn dynamic_detail(
        &self,
        id: &str,
        cookie: Option<String>,
    ) -> Result<DynamicDetail, ResolveError>;
    /// Live room; requires a session cookie
    async fn live_room_info(&self, room_id: &str, cookie: &str) -> Result<LiveCard, ResolveError>;
    /// AI summary of a video; requires a session cookie
    async fn video_summary(
        &self,
        video: &VideoCard,
        cookie: &str,
    ) -> Result<SummaryData, ResolveError>;
    /// Signed source stream URL of a video; requires a session cookie
    async fn video_stream_url(&self, video: &VideoCard, cookie: &str)
        -> Result<String, ResolveError>;
}

/// A resolved piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRecord {
    /// Video
    Video(Box<VideoCard>),
    /// Feed post
    Dynamic(Box<DynamicDetail>),
    /// Article
    Article(Box<ArticleCard>),
    /// Live room
    Live(Box<LiveCard>),
}

impl ContentRecord {
    /// Render the record's card; `id` is the id the link carried
    #[must_use]
    pub fn render(&self, id: &str) -> Reply {
        match self {
            Self::Video(card) => render::video_reply(card),
            Self::Dynamic(detail) => render::dynamic_reply(detail, id),
            Self::Article(card) => render::article_reply(card, id),
            Self::Live(card) => render::live_reply(card),
        }
    }
}

/// Resolve a classified link into its content record.
///
/// Live rooms need the session cookie, feed posts use it when available.
///
/// # Errors
///
/// Returns the fetch error, or a session error for live rooms without a
/// cookie.
pub async fn resolve(
    source: &dyn ContentSource,
    session: &dyn SessionProvider,
    link: &LinkMatch,
) -> Result<ContentRecord, ResolveError> {
    let id = link.id();
    Ok(match link.kind {
        LinkKind::Video => ContentRecord::Video(Box::new(source.video_info(id).await?)),
        LinkKind::Article => ContentRecord::Article(Box::new(source.article_info(id).await?)),
        LinkKind::Dynamic => {
            let cookie = session.load().await.ok();
            ContentRecord::Dynamic(Box::new(source.dynamic_detail(id, cookie).await?))
        }
        LinkKind::Live => {
            let cookie = session.load().await?;
            ContentRecord::Live(Box::new(source.live_room_info(id, &cookie).await?))
        }
    })
}

/// Base URLs of the two API hosts
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    /// Main web API
    pub api_base: String,
    /// Live-room API
    pub live_api_base: String,
}

impl ApiEndpoints {
    /// Endpoints configured in settings
    #[must_use]
    pub fn from_settings(settings: &CoreSettings) -> Self {
        Self::new(&settings.api_base, &settings.live_api_base)
    }

    /// Endpoints from explicit bases
    #[must_use]
    pub fn new(api_base: &str, live_api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            live_api_base: live_api_base.trim_end_matches('/').to_string(),
        }
    }
}

/// HTTP client for the Bilibili web API
pub struct BiliClient {
    http: reqwest::Client,
    endpoints: ApiEndpoints,
    mixin_keys: Cache<(), String>,
}

impl BiliClient {
    /// Client configured from settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &CoreSettings) -> Result<Self, ResolveError> {
        Self::with_endpoints(ApiEndpoints::from_settings(settings), settings.http_timeout())
    }

    /// Client against explicit endpoints
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoints(endpoints: ApiEndpoints, timeout: Duration) -> Result<Self, ResolveError> {
        // Short links are expanded by reading `Location` ourselves
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;

        let mixin_keys = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(WBI_KEY_TTL_SECS))
            .build();

        Ok(Self {
            http,
            endpoints,
            mixin_keys,
        })
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        cookie: Option<&str>,
    ) -> Result<ApiEnvelope<T>, ResolveError> {
        let request = match cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ResolveError::Http {
                status: status.as_u16(),
                body: crate::utils::truncate_str(&body, 200),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        cookie: Option<&str>,
    ) -> Result<T, ResolveError> {
        let envelope = self.get_envelope::<T>(request, cookie).await?;
        if envelope.code != 0 {
            return Err(ResolveError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }
        envelope.data.ok_or(ResolveError::MissingData)
    }

    /// Current WBI mixin key, refreshed from `nav` once per TTL
    async fn mixin_key(&self, cookie: Option<&str>) -> Result<String, ResolveError> {
        if let Some(key) = self.mixin_keys.get(&()).await {
            return Ok(key);
        }

        let url = format!("{}/x/web-interface/nav", self.endpoints.api_base);
        // `nav` answers -101 for anonymous sessions but still carries the keys
        let envelope = self
            .get_envelope::<NavData>(self.http.get(url), cookie)
            .await?;
        let Some(img) = envelope
            .data
            .map(|d| d.wbi_img)
            .filter(|img| !img.img_url.is_empty() && !img.sub_url.is_empty())
        else {
            return Err(ResolveError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        };

        let key = wbi::mixin_key(wbi::key_from_url(&img.img_url), wbi::key_from_url(&img.sub_url));
        debug!("WBI mixin key refreshed");
        self.mixin_keys.insert((), key.clone()).await;
        Ok(key)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        cookie: &str,
    ) -> Result<T, ResolveError> {
        let key = self.mixin_key(Some(cookie)).await?;
        let query = wbi::sign_query(params, &key, chrono::Utc::now().timestamp());
        let url = format!("{}{path}?{query}", self.endpoints.api_base);
        self.get_data(self.http.get(url), Some(cookie)).await
    }
}

#[async_trait]
impl RedirectResolver for BiliClient {
    async fn resolve_redirect(&self, url: &str) -> Result<String, ResolveError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_redirection() {
            return Err(ResolveError::Redirect(format!("{url} answered {status}")));
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ResolveError::Redirect(format!("{url} has no Location header")))?;
        let target = response
            .url()
            .join(location)
            .map_err(|e| ResolveError::Redirect(e.to_string()))?;
        Ok(target.to_string())
    }
}

#[async_trait]
impl ContentSource for BiliClient {
    async fn video_info(&self, id: &str) -> Result<VideoCard, ResolveError> {
        let url = format!("{}/x/web-interface/view", self.endpoints.api_base);
        let param = if id.bytes().all(|b| b.is_ascii_digit()) {
            ("aid", id)
        } else {
            ("bvid", id)
        };
        self.get_data(self.http.get(url).query(&[param]), None).await
    }

    async fn article_info(&self, id: &str) -> Result<ArticleCard, ResolveError> {
        let url = format!("{}/x/article/viewinfo", self.endpoints.api_base);
        self.get_data(self.http.get(url).query(&[("id", id)]), None)
            .await
    }

    async fn dynamic_detail(
        &self,
        id: &str,
        cookie: Option<String>,
    ) -> Result<DynamicDetail, ResolveError> {
        let url = format!(
            "{}/x/polymer/web-dynamic/v1/detail",
            self.endpoints.api_base
        );
        let request = self
            .http
            .get(url)
            .query(&[("id", id), ("features", "itemOpusStyle")]);
        self.get_data(request, cookie.as_deref()).await
    }

    async fn live_room_info(&self, room_id: &str, cookie: &str) -> Result<LiveCard, ResolveError> {
        let url = format!(
            "{}/xlive/web-room/v1/index/getInfoByRoom",
            self.endpoints.live_api_base
        );
        self.get_data(self.http.get(url).query(&[("room_id", room_id)]), Some(cookie))
            .await
    }

    async fn video_summary(
        &self,
        video: &VideoCard,
        cookie: &str,
    ) -> Result<SummaryData, ResolveError> {
        let params = [
            ("bvid", video.bvid.clone()),
            ("cid", video.cid.to_string()),
            ("up_mid", video.owner.mid.to_string()),
        ];
        self.get_signed("/x/web-interface/view/conclusion/get", &params, cookie)
            .await
    }

    async fn video_stream_url(
        &self,
        video: &VideoCard,
        cookie: &str,
    ) -> Result<String, ResolveError> {
        let params = [
            ("bvid", video.bvid.clone()),
            ("cid", video.cid.to_string()),
            ("qn", "80".to_string()),
            ("fnval", "1".to_string()),
        ];
        let data: PlayUrlData = self
            .get_signed("/x/player/wbi/playurl", &params, cookie)
            .await?;
        data.durl
            .into_iter()
            .map(|d| d.url)
            .find(|url| !url.is_empty())
            .ok_or(ResolveError::NoStream)
    }
}
