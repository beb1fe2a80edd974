//! Link classification
//!
//! Finds the first supported Bilibili link in free-form text. Short links
//! are expanded once through a [`RedirectResolver`] and the result is matched
//! again against the canonical patterns.

#![allow(clippy::non_std_lazy_statics)]

use crate::bilibili::ResolveError;
use async_trait::async_trait;
use lazy_regex::{lazy_regex, Lazy};
use regex::Regex;
use std::fmt;
use tracing::debug;

// Share cards embed links inside JSON, so every `/` may arrive as `\/`.
static RE_REDIRECT: Lazy<Regex> = lazy_regex!(r"((b23|acg)\.tv|bili2233\.cn)\\?/[0-9a-zA-Z]+");
static RE_VIDEO: Lazy<Regex> =
    lazy_regex!(r"bilibili\.com\\?/video\\?/(?:av(\d+)|([bB][vV][0-9a-zA-Z]+))");
static RE_DYNAMIC: Lazy<Regex> =
    lazy_regex!(r"(t\.bilibili\.com|m\.bilibili\.com\\?/dynamic)\\?/(\d+)");
static RE_ARTICLE: Lazy<Regex> = lazy_regex!(r"bilibili\.com\\?/read\\?/(?:cv|mobile\\?/)(\d+)");
static RE_LIVE: Lazy<Regex> = lazy_regex!(r"live\.bilibili\.com\\?/(\d+)");

/// Content category of a recognized link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Video page, by `av` number or `BV` id
    Video,
    /// Social feed post
    Dynamic,
    /// Column article
    Article,
    /// Live room
    Live,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Dynamic => "dynamic",
            Self::Article => "article",
            Self::Live => "live",
        };
        f.write_str(name)
    }
}

/// A classified link with its extracted id(s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    /// Content category
    pub kind: LinkKind,
    /// Extracted ids, primary id first
    pub ids: Vec<String>,
}

impl LinkMatch {
    /// Primary id of the match
    #[must_use]
    pub fn id(&self) -> &str {
        self.ids.first().map_or("", String::as_str)
    }
}

/// One entry of the ordered pattern table
pub struct LinkPattern {
    /// Kind produced on match
    pub kind: LinkKind,
    regex: &'static Lazy<Regex>,
    /// Alternative capture groups; the first non-empty one is the id
    id_groups: &'static [usize],
}

impl LinkPattern {
    /// Match this pattern alone against `text`
    #[must_use]
    pub fn matches(&self, text: &str) -> Option<LinkMatch> {
        let caps = self.regex.captures(text)?;
        let id = self
            .id_groups
            .iter()
            .filter_map(|&group| caps.get(group))
            .map(|m| m.as_str())
            .find(|s| !s.is_empty())?;
        Some(LinkMatch {
            kind: self.kind,
            ids: vec![id.to_string()],
        })
    }
}

/// Canonical patterns in priority order
pub static PATTERNS: [LinkPattern; 4] = [
    LinkPattern {
        kind: LinkKind::Video,
        regex: &RE_VIDEO,
        id_groups: &[1, 2],
    },
    LinkPattern {
        kind: LinkKind::Dynamic,
        regex: &RE_DYNAMIC,
        id_groups: &[2],
    },
    LinkPattern {
        kind: LinkKind::Article,
        regex: &RE_ARTICLE,
        id_groups: &[1],
    },
    LinkPattern {
        kind: LinkKind::Live,
        regex: &RE_LIVE,
        id_groups: &[1],
    },
];

/// Expands a short link to its canonical URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedirectResolver: Send + Sync {
    /// Return the URL the short link points to
    async fn resolve_redirect(&self, url: &str) -> Result<String, ResolveError>;
}

/// Match `text` against the canonical patterns only; first match wins
#[must_use]
pub fn match_canonical(text: &str) -> Option<LinkMatch> {
    PATTERNS.iter().find_map(|pattern| pattern.matches(text))
}

/// Short link found in `text`, normalized to an absolute `https://` URL
#[must_use]
pub fn find_short_link(text: &str) -> Option<String> {
    RE_REDIRECT
        .find(text)
        .map(|m| format!("https://{}", m.as_str().replace('\\', "")))
}

/// Whether `text` contains anything the classifier would act on
#[must_use]
pub fn contains_link(text: &str) -> bool {
    RE_REDIRECT.is_match(text) || PATTERNS.iter().any(|p| p.regex.is_match(text))
}

/// Classify `text`.
///
/// A short link is resolved and its target is matched exactly once; a target
/// that is itself a short link is not followed further.
///
/// # Errors
///
/// Returns the resolver's error if a short link cannot be expanded.
/// Unmatched text is `Ok(None)`.
pub async fn classify(
    text: &str,
    resolver: &dyn RedirectResolver,
) -> Result<Option<LinkMatch>, ResolveError> {
    if let Some(short) = find_short_link(text) {
        let canonical = resolver.resolve_redirect(&short).await?;
        debug!(short = %short, canonical = %canonical, "Short link resolved");
        return Ok(match_canonical(&canonical));
    }
    Ok(match_canonical(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn ids(m: &LinkMatch) -> Vec<&str> {
        m.ids.iter().map(String::as_str).collect()
    }

    #[test]
    fn video_numeric_and_bv_ids() {
        let av = match_canonical("看看 https://www.bilibili.com/video/av170001 这个").expect("av");
        assert_eq!(av.kind, LinkKind::Video);
        assert_eq!(ids(&av), ["170001"]);

        let bv = match_canonical("https://m.bilibili.com/video/BV1xx411c7mD?p=2").expect("bv");
        assert_eq!(bv.kind, LinkKind::Video);
        assert_eq!(bv.id(), "BV1xx411c7mD");

        let lower = match_canonical("bilibili.com/video/bv1xx411c7mD").expect("bv lower");
        assert_eq!(lower.id(), "bv1xx411c7mD");
    }

    #[test]
    fn dynamic_article_live() {
        let dynamic = match_canonical("https://t.bilibili.com/812345678901234567").expect("t");
        assert_eq!(dynamic.kind, LinkKind::Dynamic);
        assert_eq!(dynamic.id(), "812345678901234567");

        let mobile = match_canonical("https://m.bilibili.com/dynamic/42").expect("m");
        assert_eq!(mobile.kind, LinkKind::Dynamic);
        assert_eq!(mobile.id(), "42");

        let cv = match_canonical("https://www.bilibili.com/read/cv1234567").expect("cv");
        assert_eq!(cv.kind, LinkKind::Article);
        assert_eq!(cv.id(), "1234567");

        let read_mobile = match_canonical("https://www.bilibili.com/read/mobile/99").expect("mobile");
        assert_eq!(read_mobile.kind, LinkKind::Article);
        assert_eq!(read_mobile.id(), "99");

        let live = match_canonical("https://live.bilibili.com/21452505").expect("live");
        assert_eq!(live.kind, LinkKind::Live);
        assert_eq!(live.id(), "21452505");
    }

    #[test]
    fn escaped_slashes_from_share_cards() {
        let m = match_canonical(r#"{"url":"https:\/\/www.bilibili.com\/video\/BV1GJ411x7h7"}"#)
            .expect("escaped");
        assert_eq!(m.id(), "BV1GJ411x7h7");

        assert_eq!(
            find_short_link(r#""jumpUrl":"https:\/\/b23.tv\/abc123""#).as_deref(),
            Some("https://b23.tv/abc123")
        );
    }

    #[test]
    fn video_wins_over_later_patterns() {
        let text = "https://live.bilibili.com/1 and https://www.bilibili.com/video/av2";
        let m = match_canonical(text).expect("match");
        assert_eq!(m.kind, LinkKind::Video);
        assert_eq!(m.id(), "2");
    }

    #[test]
    fn unmatched_text() {
        assert_eq!(match_canonical("hello https://example.com/video/av1"), None);
        assert!(!contains_link("just chatting"));
        assert!(contains_link("https://bili2233.cn/xYz"));
    }

    #[tokio::test]
    async fn short_link_resolves_to_same_match() {
        let mut resolver = MockRedirectResolver::new();
        resolver
            .expect_resolve_redirect()
            .with(eq("https://b23.tv/Ab3dE"))
            .times(1)
            .returning(|_| Ok("https://www.bilibili.com/video/BV1GJ411x7h7?share=1".into()));

        let via_short = classify("分享 b23.tv/Ab3dE", &resolver).await.expect("classify");
        let direct = match_canonical("https://www.bilibili.com/video/BV1GJ411x7h7");
        assert_eq!(via_short, direct);
    }

    #[tokio::test]
    async fn redirect_is_followed_once() {
        let mut resolver = MockRedirectResolver::new();
        resolver
            .expect_resolve_redirect()
            .times(1)
            .returning(|_| Ok("https://b23.tv/again".into()));

        let result = classify("https://b23.tv/first", &resolver).await.expect("classify");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn redirect_failure_is_an_error() {
        let mut resolver = MockRedirectResolver::new();
        resolver
            .expect_resolve_redirect()
            .returning(|_| Err(ResolveError::Redirect("no location".into())));

        assert!(classify("acg.tv/zz", &resolver).await.is_err());
    }
}
