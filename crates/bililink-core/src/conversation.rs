//! Per-conversation feature flags packed into a single integer word.
//!
//! The word is shared with other features of the host: bits 0-7 hold a
//! request rate percentage and bits 8-15 a sampling temperature. The link
//! parser only owns bits 24-28; every other bit is carried through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary appended to video info cards
pub const FLAG_SUMMARY: i64 = 1 << 24;
/// Clip download for videos
pub const FLAG_DOWNLOAD: i64 = 1 << 25;
/// Info card for videos
pub const FLAG_INFO: i64 = 1 << 26;
/// Download cap mode: duration
pub const FLAG_LIMIT_TIME: i64 = 1 << 27;
/// Download cap mode: file size
pub const FLAG_LIMIT_SIZE: i64 = 1 << 28;

const RATE_MASK: i64 = 0xFF;
const TEMPERATURE_SHIFT: u32 = 8;
const TEMPERATURE_MASK: i64 = 0xFF << TEMPERATURE_SHIFT;
const OWNED_MASK: i64 = FLAG_SUMMARY | FLAG_DOWNLOAD | FLAG_INFO | FLAG_LIMIT_TIME | FLAG_LIMIT_SIZE;

/// Stable identifier of a chat conversation.
///
/// Group chats map to a positive value and private chats to a negative one,
/// so the two namespaces never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(pub i64);

impl ConversationKey {
    /// Key for a group conversation
    #[must_use]
    pub const fn group(group_id: i64) -> Self {
        Self(group_id.saturating_abs())
    }

    /// Key for a private conversation with a user
    #[must_use]
    pub const fn private(user_id: i64) -> Self {
        Self(-user_id.saturating_abs())
    }

    /// Raw integer value
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a downloaded clip is capped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMode {
    /// Cap by duration in seconds
    Time,
    /// Cap by file size in megabytes
    Size,
}

impl LimitMode {
    /// Mode opposing this one
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Time => Self::Size,
            Self::Size => Self::Time,
        }
    }
}

/// Video feature that can be toggled per conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// AI summary
    Summary,
    /// Clip download
    Download,
    /// Info card
    Info,
}

impl Feature {
    /// Human label used in command acknowledgements
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Summary => "总结",
            Self::Download => "上传",
            Self::Info => "信息",
        }
    }
}

/// Decoded view of a conversation's config word
///
/// The two limit flags are never both encoded. A conversation that never ran
/// a limit command has neither, and its downloads follow the mode stored in
/// `video_limit.json`, falling back to time mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationConfig {
    /// Append an AI summary to video info cards
    pub summary_enabled: bool,
    /// Download and attach a clip for videos
    pub download_enabled: bool,
    /// Send the info card for videos
    pub info_enabled: bool,
    /// Download cap mode picked by the last limit command. `None` until one
    /// runs; a word with both limit bits set decodes as [`LimitMode::Time`].
    pub limit_mode: Option<LimitMode>,
    /// Request rate percentage owned by another feature
    pub request_rate_percent: u8,
    /// Sampling temperature owned by another feature
    pub temperature: u8,
    reserved: i64,
}

impl ConversationConfig {
    /// Decode a raw config word. Unknown bits are kept for re-encoding.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn from_bits(bits: i64) -> Self {
        let limit_mode = if bits & FLAG_LIMIT_TIME != 0 {
            Some(LimitMode::Time)
        } else if bits & FLAG_LIMIT_SIZE != 0 {
            Some(LimitMode::Size)
        } else {
            None
        };

        Self {
            summary_enabled: bits & FLAG_SUMMARY != 0,
            download_enabled: bits & FLAG_DOWNLOAD != 0,
            info_enabled: bits & FLAG_INFO != 0,
            limit_mode,
            request_rate_percent: (bits & RATE_MASK) as u8,
            temperature: ((bits & TEMPERATURE_MASK) >> TEMPERATURE_SHIFT) as u8,
            reserved: bits & !(OWNED_MASK | RATE_MASK | TEMPERATURE_MASK),
        }
    }

    /// Encode back into a raw config word
    #[must_use]
    pub const fn to_bits(&self) -> i64 {
        let mut bits = self.reserved;
        bits |= self.request_rate_percent as i64;
        bits |= (self.temperature as i64) << TEMPERATURE_SHIFT;
        if self.summary_enabled {
            bits |= FLAG_SUMMARY;
        }
        if self.download_enabled {
            bits |= FLAG_DOWNLOAD;
        }
        if self.info_enabled {
            bits |= FLAG_INFO;
        }
        match self.limit_mode {
            Some(LimitMode::Time) => bits |= FLAG_LIMIT_TIME,
            Some(LimitMode::Size) => bits |= FLAG_LIMIT_SIZE,
            None => {}
        }
        bits
    }

    /// Whether a feature is enabled
    #[must_use]
    pub const fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Summary => self.summary_enabled,
            Feature::Download => self.download_enabled,
            Feature::Info => self.info_enabled,
        }
    }

    /// Enable or disable a feature
    pub fn set_enabled(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::Summary => self.summary_enabled = enabled,
            Feature::Download => self.download_enabled = enabled,
            Feature::Info => self.info_enabled = enabled,
        }
    }
}
