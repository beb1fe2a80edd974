use crate::bot::{AdminCache, TelegramReplyTransport};
use crate::config::BotSettings;
use anyhow::Result;
use bililink_core::utils::truncate_str;
use bililink_core::{
    AdminCommand, ConversationKey, IncomingMessage, LinkDispatcher, Reply, ReplyTransport,
};
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{Me, UserId},
    utils::command::BotCommands,
};
use tracing::{debug, error, info};

const HELP_TEXT: &str = "发送 B 站视频、动态、专栏或直播间链接（支持 b23.tv 短链），我会回复内容信息。\n\n\
管理员命令：\n\
• 开启/关闭视频信息\n\
• 开启/关闭视频总结\n\
• 开启/关闭视频上传\n\
• 设置视频时长限制<数字><秒|分钟|小时>\n\
• 设置视频大小限制<数字><MB|GB>\n\n\
English aliases: enable|disable video info|summary|download, \
set duration limit 8m, set size limit 100MB";

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show usage
    #[command(description = "Show usage.")]
    Help,
    /// Show this chat's settings
    #[command(description = "Show this chat's settings.")]
    Status,
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Conversation key for a chat: positive chat id for groups, negated user id
/// for private chats
#[must_use]
pub fn conversation_key_for(chat_id: i64, is_private: bool, user_id: i64) -> ConversationKey {
    if is_private {
        ConversationKey::private(user_id)
    } else {
        ConversationKey::group(chat_id)
    }
}

/// Conversation key of the chat `msg` was sent in
#[must_use]
pub fn conversation_key(msg: &Message) -> ConversationKey {
    conversation_key_for(msg.chat.id.0, msg.chat.is_private(), get_user_id_safe(msg))
}

/// Text of a message, falling back to a media caption
#[must_use]
pub fn message_text(msg: &Message) -> Option<&str> {
    msg.text().or_else(|| msg.caption())
}

/// Whether a message speaks to the bot directly
#[must_use]
pub fn is_addressed_to(
    is_private: bool,
    replies_to_bot: bool,
    text: &str,
    bot_username: &str,
) -> bool {
    is_private || replies_to_bot || mentions(text, bot_username)
}

fn mentions(text: &str, bot_username: &str) -> bool {
    if bot_username.is_empty() {
        return false;
    }
    let mention = format!("@{}", bot_username.to_lowercase());
    text.to_lowercase().contains(&mention)
}

/// Whether `msg` is addressed to the running bot
#[must_use]
pub fn is_addressed(msg: &Message, me: &Me) -> bool {
    let replies_to_bot = msg
        .reply_to_message()
        .and_then(|m| m.from.as_ref())
        .is_some_and(|u| u.id == me.user.id);
    is_addressed_to(
        msg.chat.is_private(),
        replies_to_bot,
        message_text(msg).unwrap_or_default(),
        me.username(),
    )
}

/// Remove `@bot` mentions so commands can be written as `@bot 开启视频总结`
#[must_use]
pub fn strip_mention(text: &str, bot_username: &str) -> String {
    if bot_username.is_empty() {
        return text.trim().to_string();
    }
    let mention = format!("@{bot_username}");
    text.split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case(&mention))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Admin check: configured admins, the owner of a private chat, or a chat
/// administrator as reported by Telegram
pub async fn is_admin(bot: &Bot, msg: &Message, settings: &BotSettings, cache: &AdminCache) -> bool {
    let user_id = get_user_id_safe(msg);
    if user_id == 0 {
        return false;
    }
    if settings.telegram.admin_users().contains(&user_id) || msg.chat.is_private() {
        return true;
    }

    let chat_id = msg.chat.id;
    let member_id = UserId(user_id.cast_unsigned());
    cache
        .is_admin(chat_id.0, user_id, async move {
            let member = bot.get_chat_member(chat_id, member_id).await?;
            Ok::<_, anyhow::Error>(member.kind.is_privileged())
        })
        .await
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    info!(user_id = get_user_id_safe(&msg), "/start received");
    bot.send_message(
        msg.chat.id,
        "你好！把 B 站链接发给我，我会解析视频、动态、专栏和直播间。\n发送 /help 查看用法。",
    )
    .await?;
    Ok(())
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the usage text cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        format!("{HELP_TEXT}\n\n{}", Command::descriptions()),
    )
    .await?;
    Ok(())
}

/// Status handler - shows the chat's feature flags and effective download cap
///
/// # Errors
///
/// Returns an error if the status response cannot be sent.
pub async fn status(bot: Bot, msg: Message, dispatcher: Arc<LinkDispatcher>) -> Result<()> {
    let key = conversation_key(&msg);
    let text = match dispatcher.status(key).await {
        Ok(text) => text,
        Err(e) => {
            error!(conversation = %key, error = %e, "Cannot read conversation config");
            Reply::error(&e).joined_text()
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Text message handler: admin commands first, then the link pipeline
///
/// # Errors
///
/// Returns an error if a command reply cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    me: Me,
    dispatcher: Arc<LinkDispatcher>,
    settings: Arc<BotSettings>,
    admins: Arc<AdminCache>,
) -> Result<()> {
    let Some(text) = message_text(&msg) else {
        return Ok(());
    };
    let key = conversation_key(&msg);
    let transport = TelegramReplyTransport::new(bot.clone(), msg.chat.id);

    match AdminCommand::parse(&strip_mention(text, me.username())) {
        Ok(Some(command)) => {
            if !is_admin(&bot, &msg, &settings, &admins).await {
                debug!(conversation = %key, user_id = get_user_id_safe(&msg), "Ignoring admin command from non-admin");
                return Ok(());
            }
            info!(conversation = %key, ?command, "Admin command");
            let reply = dispatcher.execute_command(key, command).await;
            return transport.send(reply).await;
        }
        Err(e) => {
            if is_admin(&bot, &msg, &settings, &admins).await {
                return transport.send(Reply::error(&e)).await;
            }
            return Ok(());
        }
        Ok(None) => {}
    }

    let incoming = IncomingMessage {
        key,
        text: text.to_string(),
        addressed: is_addressed(&msg, &me),
    };
    debug!(
        conversation = %key,
        addressed = incoming.addressed,
        "Handling message: '{}'",
        truncate_str(&incoming.text, 100)
    );

    // Clips can take minutes; the update loop must not wait for them
    tokio::spawn(async move {
        dispatcher.handle_links(&incoming, &transport).await;
    });
    Ok(())
}
