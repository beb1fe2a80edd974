//! AI summary fetcher

use crate::bilibili::models::{SummaryData, VideoCard};
use crate::bilibili::{ContentSource, ResolveError};
use crate::reply::Reply;
use crate::session::{SessionError, SessionProvider};
use crate::utils::format_timestamp;
use std::fmt::Write as _;
use thiserror::Error;

/// Errors from fetching a summary
#[derive(Error, Debug)]
pub enum SummaryError {
    /// Session cookie unavailable
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Fetch failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The model produced nothing for this video
    #[error("no summary available for this video")]
    Empty,
}

/// Fetch and format the summary of `video`.
///
/// # Errors
///
/// Returns an error when the cookie is missing, the request fails, or the
/// video has no summary.
pub async fn summarize(
    source: &dyn ContentSource,
    session: &dyn SessionProvider,
    video: &VideoCard,
) -> Result<Reply, SummaryError> {
    let cookie = session.load().await?;
    let data = source.video_summary(video, &cookie).await?;
    if data.model_result.summary.is_empty() && data.model_result.outline.is_empty() {
        return Err(SummaryError::Empty);
    }
    Ok(Reply::text(format_summary(&data)))
}

/// Header, summary text, then each outline section as `● title` followed by
/// `m:ss content` lines
#[must_use]
pub fn format_summary(data: &SummaryData) -> String {
    let mut text = String::from("已为你生成视频总结\n\n");
    let _ = write!(text, "{}\n\n", data.model_result.summary);
    for section in &data.model_result.outline {
        let _ = writeln!(text, "● {}", section.title);
        for point in &section.part_outline {
            let _ = writeln!(text, "{} {}", format_timestamp(point.timestamp), point.content);
        }
        text.push('\n');
    }
    text
}
