//! Outgoing reply model and the transport seam

use async_trait::async_trait;
use std::fmt::Display;
use std::path::PathBuf;

/// One piece of an outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain text
    Text(String),
    /// Remote image by URL
    Image(String),
    /// Local video file
    Video(PathBuf),
}

/// An ordered list of segments sent as one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply(pub Vec<Segment>);

impl Reply {
    /// Empty reply
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Reply holding a single text segment
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self(vec![Segment::Text(text.into())])
    }

    /// The `ERROR: <err>` reply used for every user-facing failure
    #[must_use]
    pub fn error(err: &impl Display) -> Self {
        Self::text(error_text(err))
    }

    /// Append a segment
    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    /// Append a text segment
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.0.push(Segment::Text(text.into()));
    }

    /// Append all segments of another reply
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Segments in order
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Whether there is nothing to send
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenation of all text segments
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.0
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Render an error the way users see it
#[must_use]
pub fn error_text(err: &impl Display) -> String {
    format!("ERROR: {err}")
}

/// Delivers replies to the conversation a message came from
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    /// Send one reply as one message (or the transport's closest equivalent)
    async fn send(&self, reply: Reply) -> anyhow::Result<()>;
}
