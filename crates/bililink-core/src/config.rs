//! Configuration and settings management
//!
//! Loads settings from layered config files and environment variables and
//! defines the pipeline constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Desktop browser User-Agent sent to the Bilibili API and media origin
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36";
/// Referer the media origin expects on stream fetches
pub const BILIBILI_REFERER: &str = "https://www.bilibili.com";

/// Default download duration cap in seconds (8 minutes)
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 480;
/// Default download size cap in megabytes
pub const DEFAULT_SIZE_LIMIT_MB: u64 = 100;

/// Fixed rate limiter window
pub const RATE_LIMIT_WINDOW_SECS: u64 = 10;
/// Maximum number of tracked rate limiter windows
pub const RATE_LIMIT_MAX_KEYS: u64 = 100_000;

/// How long a derived WBI mixin key stays valid
pub const WBI_KEY_TTL_SECS: u64 = 3600;

/// File name of the global limit policy inside the data directory
pub const LIMIT_POLICY_FILE: &str = "video_limit.json";
/// File name of the conversation config store inside the data directory
pub const CONVERSATION_STORE_FILE: &str = "conversations.json";

/// Core pipeline settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreSettings {
    /// Directory holding persisted state (limit policy, conversation flags)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory for transcoded clips, defaults to `<data_dir>/cache`
    pub cache_dir: Option<PathBuf>,
    /// JSON file containing the Bilibili session cookie
    #[serde(default = "default_cookie_file")]
    pub cookie_file: PathBuf,
    /// Inline session cookie, takes precedence over `cookie_file`
    pub bilibili_cookie: Option<String>,
    /// Path or name of the ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Timeout for Bilibili API requests
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Rate limiter window length
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Wipe the cache directory at startup
    #[serde(default = "default_true")]
    pub purge_cache_on_start: bool,
    /// Base URL of the main web API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL of the live-room API
    #[serde(default = "default_live_api_base")]
    pub live_api_base: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/bililink")
}

fn default_cookie_file() -> PathBuf {
    PathBuf::from("data/Bilibili/config.json")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

const fn default_http_timeout_secs() -> u64 {
    30
}

const fn default_rate_limit_window_secs() -> u64 {
    RATE_LIMIT_WINDOW_SECS
}

const fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_live_api_base() -> String {
    "https://api.live.bilibili.com".to_string()
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_dir: None,
            cookie_file: default_cookie_file(),
            bilibili_cookie: None,
            ffmpeg_path: default_ffmpeg_path(),
            http_timeout_secs: default_http_timeout_secs(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            purge_cache_on_start: true,
            api_base: default_api_base(),
            live_api_base: default_live_api_base(),
        }
    }
}

/// Build the layered configuration shared by every crate of the workspace.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `BILILINK__FFMPEG_PATH=/usr/bin/ffmpeg`
        .add_source(Environment::with_prefix("BILILINK").separator("__"))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl CoreSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Directory for transcoded clips
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("cache"))
    }

    /// Path of the global limit policy file
    #[must_use]
    pub fn limit_policy_path(&self) -> PathBuf {
        self.data_dir.join(LIMIT_POLICY_FILE)
    }

    /// Path of the conversation config store
    #[must_use]
    pub fn conversation_store_path(&self) -> PathBuf {
        self.data_dir.join(CONVERSATION_STORE_FILE)
    }

    /// HTTP timeout as a `Duration`
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Rate limiter window as a `Duration`
    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("BILILINK__FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg");
        env::set_var("BILILINK__RATE_LIMIT_WINDOW_SECS", "3");

        let settings = CoreSettings::new()?;
        assert_eq!(settings.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(settings.rate_limit_window(), Duration::from_secs(3));

        env::remove_var("BILILINK__FFMPEG_PATH");
        env::remove_var("BILILINK__RATE_LIMIT_WINDOW_SECS");
        Ok(())
    }

    #[test]
    fn test_derived_paths() {
        let settings = CoreSettings {
            data_dir: PathBuf::from("/srv/bili"),
            ..CoreSettings::default()
        };
        assert_eq!(settings.cache_dir(), PathBuf::from("/srv/bili/cache"));
        assert_eq!(
            settings.limit_policy_path(),
            PathBuf::from("/srv/bili/video_limit.json")
        );

        let settings = CoreSettings {
            cache_dir: Some(PathBuf::from("/tmp/clips")),
            ..settings
        };
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/clips"));
    }
}
