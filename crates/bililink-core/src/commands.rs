//! Admin commands: feature toggles and download cap settings
//!
//! Triggers are the Chinese phrases users already know plus short English
//! aliases. Permission checks belong to the transport.

use crate::conversation::{ConversationKey, Feature, LimitMode};
use crate::limit::{LimitPolicy, LimitPolicyStore};
use crate::storage::{ConversationConfigStore, StorageError};
use lazy_regex::regex_captures;
use thiserror::Error;
use tracing::info;

/// Errors from parsing or applying an admin command
#[derive(Error, Debug)]
pub enum CommandError {
    /// Number does not fit or is missing
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    /// Unit suffix not recognized
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    /// A cap of zero would produce empty clips
    #[error("limit must be greater than zero")]
    ZeroLimit,
    /// Persisting the change failed
    #[error("failed to save config: {0}")]
    Storage(#[from] StorageError),
}

/// A parsed admin command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Enable or disable a video feature for the conversation
    Toggle {
        /// Target feature
        feature: Feature,
        /// New state
        enable: bool,
    },
    /// Cap downloads by duration
    SetDurationLimit {
        /// Cap in seconds
        seconds: u64,
    },
    /// Cap downloads by file size
    SetSizeLimit {
        /// Cap in megabytes
        megabytes: u64,
    },
}

impl AdminCommand {
    /// Parse a full message as an admin command.
    ///
    /// Returns `Ok(None)` when the text is not a command at all.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is a limit command with a bad value.
    pub fn parse(text: &str) -> Result<Option<Self>, CommandError> {
        let text = text.trim();

        if let Some((_, verb, target)) =
            regex_captures!(r"^(开启|打开|启用|关闭|关掉|禁用)视频(总结|上传|信息)$", text)
        {
            let enable = matches!(verb, "开启" | "打开" | "启用");
            return Ok(feature_from(target).map(|feature| Self::Toggle { feature, enable }));
        }
        if let Some((_, verb, target)) =
            regex_captures!(r"(?i)^(enable|disable)\s+video\s+(summary|download|info)$", text)
        {
            let enable = verb.eq_ignore_ascii_case("enable");
            return Ok(feature_from(target).map(|feature| Self::Toggle { feature, enable }));
        }

        if let Some((_, value)) = regex_captures!(r"^设置视频时长限制(\S+)$", text)
            .or_else(|| regex_captures!(r"(?i)^set\s+duration\s+limit\s+(\S+)$", text))
        {
            let seconds = parse_duration(value)?;
            return Ok(Some(Self::SetDurationLimit { seconds }));
        }
        if let Some((_, value)) = regex_captures!(r"^设置视频大小限制(\S+)$", text)
            .or_else(|| regex_captures!(r"(?i)^set\s+size\s+limit\s+(\S+)$", text))
        {
            let megabytes = parse_size(value)?;
            return Ok(Some(Self::SetSizeLimit { megabytes }));
        }

        Ok(None)
    }
}

fn feature_from(target: &str) -> Option<Feature> {
    match target.to_ascii_lowercase().as_str() {
        "总结" | "summary" => Some(Feature::Summary),
        "上传" | "download" => Some(Feature::Download),
        "信息" | "info" => Some(Feature::Info),
        _ => None,
    }
}

fn split_number(text: &str) -> Result<(u64, &str), CommandError> {
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(digits_end);
    let value = digits
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))?;
    if value == 0 {
        return Err(CommandError::ZeroLimit);
    }
    Ok((value, unit.trim()))
}

/// Parse a duration such as `45秒`, `2分钟`, `1小时` (or `45s`, `2m`, `1h`)
/// into seconds.
///
/// # Errors
///
/// Returns an error for a missing number, zero, overflow, or unknown unit.
pub fn parse_duration(text: &str) -> Result<u64, CommandError> {
    let (value, unit) = split_number(text)?;
    let factor = match unit.to_ascii_lowercase().as_str() {
        "秒" | "s" => 1,
        "分钟" | "m" => 60,
        "小时" | "h" => 3600,
        other => return Err(CommandError::UnknownUnit(other.to_string())),
    };
    value
        .checked_mul(factor)
        .ok_or_else(|| CommandError::InvalidNumber(text.to_string()))
}

/// Parse a size such as `100MB` or `2GB` into megabytes.
///
/// # Errors
///
/// Returns an error for a missing number, zero, overflow, or unknown unit.
pub fn parse_size(text: &str) -> Result<u64, CommandError> {
    let (value, unit) = split_number(text)?;
    let factor = match unit.to_ascii_uppercase().as_str() {
        "MB" => 1,
        "GB" => 1024,
        other => return Err(CommandError::UnknownUnit(other.to_string())),
    };
    value
        .checked_mul(factor)
        .ok_or_else(|| CommandError::InvalidNumber(text.to_string()))
}

/// Render seconds as `X小时Y分钟Z秒`, `Y分钟Z秒` or `Z秒`
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if hours > 0 {
        format!("{hours}小时{minutes}分钟{secs}秒")
    } else if minutes > 0 {
        format!("{minutes}分钟{secs}秒")
    } else {
        format!("{secs}秒")
    }
}

/// Render megabytes as `NMB`, or `x.yGB` from 1024 MB upwards
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(megabytes: u64) -> String {
    if megabytes >= 1024 {
        format!("{:.1}GB", megabytes as f64 / 1024.0)
    } else {
        format!("{megabytes}MB")
    }
}

/// Render a policy for status output
#[must_use]
pub fn format_policy(policy: &LimitPolicy) -> String {
    match policy.mode {
        LimitMode::Time => format!("时长 {}", format_duration(policy.value)),
        LimitMode::Size => format!("大小 {}", format_size(policy.value)),
    }
}

/// Apply a command to a conversation and return the confirmation text.
///
/// Limit commands persist the value into the global policy file first, then
/// select the matching mode on the conversation, which clears the other mode.
///
/// # Errors
///
/// Returns an error if either store fails to persist.
pub async fn execute(
    command: AdminCommand,
    key: ConversationKey,
    configs: &ConversationConfigStore,
    limits: &LimitPolicyStore,
) -> Result<String, CommandError> {
    let reply = match command {
        AdminCommand::Toggle { feature, enable } => {
            configs
                .update(key, |c| c.set_enabled(feature, enable))
                .await?;
            let action = if enable { "开启" } else { "关闭" };
            format!("已{action}视频{}", feature.label())
        }
        AdminCommand::SetDurationLimit { seconds } => {
            apply_limit(key, LimitPolicy::seconds(seconds), configs, limits).await?;
            format!("已设置视频时长限制为: {}", format_duration(seconds))
        }
        AdminCommand::SetSizeLimit { megabytes } => {
            apply_limit(key, LimitPolicy::megabytes(megabytes), configs, limits).await?;
            format!("已设置视频大小限制为: {}", format_size(megabytes))
        }
    };
    info!(conversation = %key, ?command, "Admin command applied");
    Ok(reply)
}

/// Store the policy and select its mode for the conversation under one lock,
/// so the flag and the file never disagree about the mode.
async fn apply_limit(
    key: ConversationKey,
    policy: LimitPolicy,
    configs: &ConversationConfigStore,
    limits: &LimitPolicyStore,
) -> Result<(), CommandError> {
    limits
        .save_then(policy, || async {
            configs
                .update(key, |c| c.limit_mode = Some(policy.mode))
                .await
                .map(|_| ())
                .map_err(CommandError::from)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{
        FLAG_DOWNLOAD, FLAG_INFO, FLAG_LIMIT_SIZE, FLAG_LIMIT_TIME, FLAG_SUMMARY,
    };
    use crate::storage::{ConfigBackend, JsonFileBackend};
    use std::sync::Arc;

    async fn stores(
        dir: &tempfile::TempDir,
    ) -> (Arc<JsonFileBackend>, ConversationConfigStore, LimitPolicyStore) {
        let backend = Arc::new(
            JsonFileBackend::open(dir.path().join("c.json"))
                .await
                .expect("open"),
        );
        let configs = ConversationConfigStore::new(backend.clone());
        let limits = LimitPolicyStore::new(dir.path().join("video_limit.json"));
        (backend, configs, limits)
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("2分钟").expect("minutes"), 120);
        assert_eq!(parse_duration("1小时").expect("hours"), 3600);
        assert_eq!(parse_duration("45秒").expect("seconds"), 45);
        assert_eq!(parse_duration("3m").expect("alias"), 180);
        assert!(matches!(parse_duration("5天"), Err(CommandError::UnknownUnit(_))));
        assert!(matches!(parse_duration("0秒"), Err(CommandError::ZeroLimit)));
        assert!(matches!(parse_duration("分钟"), Err(CommandError::InvalidNumber(_))));
    }

    #[test]
    fn size_units() {
        assert_eq!(parse_size("2GB").expect("gb"), 2048);
        assert_eq!(parse_size("100MB").expect("mb"), 100);
        assert_eq!(parse_size("5gb").expect("lowercase"), 5120);
        assert!(parse_size("100KB").is_err());
    }

    #[test]
    fn display_formats() {
        assert_eq!(format_duration(45), "45秒");
        assert_eq!(format_duration(120), "2分钟0秒");
        assert_eq!(format_duration(3725), "1小时2分钟5秒");
        assert_eq!(format_size(100), "100MB");
        assert_eq!(format_size(1536), "1.5GB");
    }

    #[test]
    fn parses_triggers_and_aliases() {
        assert_eq!(
            AdminCommand::parse("打开视频总结").expect("parse"),
            Some(AdminCommand::Toggle {
                feature: Feature::Summary,
                enable: true
            })
        );
        assert_eq!(
            AdminCommand::parse("禁用视频上传").expect("parse"),
            Some(AdminCommand::Toggle {
                feature: Feature::Download,
                enable: false
            })
        );
        assert_eq!(
            AdminCommand::parse("Enable video info").expect("parse"),
            Some(AdminCommand::Toggle {
                feature: Feature::Info,
                enable: true
            })
        );
        assert_eq!(
            AdminCommand::parse("设置视频时长限制2分钟").expect("parse"),
            Some(AdminCommand::SetDurationLimit { seconds: 120 })
        );
        assert_eq!(
            AdminCommand::parse("set size limit 2GB").expect("parse"),
            Some(AdminCommand::SetSizeLimit { megabytes: 2048 })
        );
        assert_eq!(AdminCommand::parse("开启视频弹幕").expect("parse"), None);
        assert_eq!(
            AdminCommand::parse("https://b23.tv/abc").expect("parse"),
            None
        );
        assert!(AdminCommand::parse("设置视频大小限制10TB").is_err());
    }

    #[tokio::test]
    async fn limit_commands_keep_modes_exclusive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = JsonFileBackend::open(dir.path().join("c.json"))
            .await
            .expect("open");
        let configs = ConversationConfigStore::new(Arc::new(backend));
        let limits = LimitPolicyStore::new(dir.path().join("video_limit.json"));
        let key = ConversationKey::group(10);

        let reply = execute(
            AdminCommand::SetSizeLimit { megabytes: 200 },
            key,
            &configs,
            &limits,
        )
        .await
        .expect("size");
        assert_eq!(reply, "已设置视频大小限制为: 200MB");
        assert_eq!(
            configs.get(key).await.expect("get").limit_mode,
            Some(LimitMode::Size)
        );
        assert_eq!(limits.load().await, Some(LimitPolicy::megabytes(200)));

        execute(
            AdminCommand::SetDurationLimit { seconds: 90 },
            key,
            &configs,
            &limits,
        )
        .await
        .expect("time");
        let bits = configs.get(key).await.expect("get").to_bits();
        assert_ne!(bits & FLAG_LIMIT_TIME, 0);
        assert_eq!(bits & FLAG_LIMIT_SIZE, 0);
        assert_eq!(limits.load().await, Some(LimitPolicy::seconds(90)));
    }

    #[tokio::test]
    async fn toggles_touch_only_their_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = JsonFileBackend::open(dir.path().join("c.json"))
            .await
            .expect("open");
        let configs = ConversationConfigStore::new(Arc::new(backend));
        let limits = LimitPolicyStore::new(dir.path().join("video_limit.json"));
        let key = ConversationKey::private(3);

        for feature in [Feature::Summary, Feature::Download, Feature::Info] {
            let before = configs.get(key).await.expect("get");
            let reply = execute(
                AdminCommand::Toggle {
                    feature,
                    enable: true,
                },
                key,
                &configs,
                &limits,
            )
            .await
            .expect("toggle");
            assert!(reply.starts_with("已开启视频"));

            let mut expected = before;
            expected.set_enabled(feature, true);
            assert_eq!(configs.get(key).await.expect("get"), expected);
        }
    }

    #[tokio::test]
    async fn limit_commands_leave_other_fields_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, configs, limits) = stores(&dir).await;
        let key = ConversationKey::group(11);
        let unknown_bit = 1_i64 << 40;
        let word = FLAG_SUMMARY | FLAG_DOWNLOAD | FLAG_INFO | 30 | (55 << 8) | unknown_bit;
        backend.set(key.as_i64(), word).await.expect("seed");

        let commands = [
            (AdminCommand::SetSizeLimit { megabytes: 64 }, LimitMode::Size),
            (AdminCommand::SetDurationLimit { seconds: 300 }, LimitMode::Time),
            (AdminCommand::SetSizeLimit { megabytes: 128 }, LimitMode::Size),
        ];
        for (command, mode) in commands {
            let before = configs.get(key).await.expect("get");
            execute(command, key, &configs, &limits)
                .await
                .expect("limit command");

            let after = configs.get(key).await.expect("get");
            let mut expected = before;
            expected.limit_mode = Some(mode);
            assert_eq!(after, expected);
            assert!(after.summary_enabled && after.download_enabled && after.info_enabled);
            assert_eq!(after.request_rate_percent, 30);
            assert_eq!(after.temperature, 55);

            let bits = backend.get(key.as_i64()).await.expect("raw");
            assert_eq!(bits & unknown_bit, unknown_bit);
            assert_eq!(
                bits & !(FLAG_LIMIT_TIME | FLAG_LIMIT_SIZE),
                word,
                "only the limit flags may change"
            );
            let (set, cleared) = match mode {
                LimitMode::Time => (FLAG_LIMIT_TIME, FLAG_LIMIT_SIZE),
                LimitMode::Size => (FLAG_LIMIT_SIZE, FLAG_LIMIT_TIME),
            };
            assert_ne!(bits & set, 0);
            assert_eq!(bits & cleared, 0);
        }
    }

    #[tokio::test]
    async fn concurrent_limit_commands_agree_with_stored_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_backend, configs, limits) = stores(&dir).await;
        let key = ConversationKey::group(12);

        for round in 0..20_u64 {
            let (time, size) = tokio::join!(
                execute(
                    AdminCommand::SetDurationLimit { seconds: 60 + round },
                    key,
                    &configs,
                    &limits,
                ),
                execute(
                    AdminCommand::SetSizeLimit { megabytes: 10 + round },
                    key,
                    &configs,
                    &limits,
                ),
            );
            time.expect("time");
            size.expect("size");

            let stored = limits.load().await.expect("policy file");
            let mode = configs.get(key).await.expect("get").limit_mode;
            assert_eq!(mode, Some(stored.mode), "round {round}");
        }
    }
}
