use std::sync::Arc;

use anyhow::Context;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use relay_core::{
    commands::{self, CommandContext, COMMANDS},
    domain::{ChatId, Destination},
};

/// Long-poll Telegram and answer chat commands until Ctrl-C.
pub async fn run_bot(bot: Bot, ctx: Arc<CommandContext>) -> anyhow::Result<()> {
    let me = bot
        .get_me()
        .await
        .context("telegram getMe failed; check TELEGRAM_BOT_TOKEN")?;
    info!(username = %me.username(), "bot started");

    let menu: Vec<BotCommand> = COMMANDS
        .iter()
        .filter(|c| c.name != "start")
        .map(|c| BotCommand::new(c.name, c.description))
        .collect();
    if let Err(e) = bot.set_my_commands(menu).await {
        warn!(error = %e, "failed to register command menu");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("bot stopped");
    Ok(())
}

async fn handle_message(msg: Message, ctx: Arc<CommandContext>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let dest = Destination::Chat(ChatId(msg.chat.id.0));
    if let Some(outcome) = commands::dispatch(&ctx, dest, text).await {
        if !outcome.is_sent() {
            warn!(chat_id = msg.chat.id.0, class = outcome.class(), "command reply not delivered");
        }
    }
    Ok(())
}
