use crate::bot;
use crate::bot::handlers::{message_text, Command};
use crate::bot::AdminCache;
use crate::config::{BotSettings, ADMIN_CACHE_MAX_SIZE, ADMIN_CACHE_TTL_SECS};
use bililink_core::LinkDispatcher;
use std::convert::Infallible;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::Me;
use tracing::{error, info};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let dispatcher = init_dispatcher(&settings).await;

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let admins = Arc::new(AdminCache::new(ADMIN_CACHE_TTL_SECS, ADMIN_CACHE_MAX_SIZE));
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher, settings, admins])
        // Every update runs on its own; one chat's slow clip never holds up another
        .distribution_function(|_| None::<Infallible>)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn init_dispatcher(settings: &BotSettings) -> Arc<LinkDispatcher> {
    match LinkDispatcher::from_settings(&settings.core).await {
        Ok(d) => {
            info!("Link pipeline initialized.");
            Arc::new(d)
        }
        Err(e) => {
            error!("Failed to initialize link pipeline: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| message_text(&msg).is_some()).endpoint(handle_text))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dispatcher: Arc<LinkDispatcher>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Status => bot::handlers::status(bot, msg, dispatcher).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    me: Me,
    dispatcher: Arc<LinkDispatcher>,
    settings: Arc<BotSettings>,
    admins: Arc<AdminCache>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(bot, msg, me, dispatcher, settings, admins).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}
