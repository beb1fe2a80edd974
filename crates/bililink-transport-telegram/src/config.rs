//! Telegram transport settings.

use bililink_core::CoreSettings;
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Comma-separated list of user IDs that may run admin commands in any chat.
    #[serde(rename = "admin_users")]
    pub admin_users_str: Option<String>,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Core settings shared with the link pipeline.
    pub core: Arc<CoreSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(core: CoreSettings, telegram: TelegramSettings) -> Self {
        Self {
            core: Arc::new(core),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        bililink_core::config::build_config()?.try_deserialize()
    }

    /// Returns the set of global admin user IDs.
    #[must_use]
    pub fn admin_users(&self) -> HashSet<i64> {
        self.admin_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// How long a chat administrator lookup is trusted (seconds).
pub const ADMIN_CACHE_TTL_SECS: u64 = 300;
/// Maximum number of cached `(chat, user)` administrator lookups.
pub const ADMIN_CACHE_MAX_SIZE: u64 = 10_000;
/// Telegram limit for a single text message (characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;
/// Telegram limit for a media caption (characters).
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;
/// Largest file the Bot API accepts for upload (bytes).
pub const TELEGRAM_UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;
