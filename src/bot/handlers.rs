//! Command, message and callback handlers
//!
//! Handlers return `anyhow::Result`; the dispatcher wrappers in `main.rs`
//! log errors and keep the bot running.

use super::callback::CallbackData;
use super::delivery::{run_job, DownloadJob};
use super::links::extract_youtube_url;
use super::resilient::{edit_message_safe_resilient, send_message_resilient};
use super::sessions::MenuSessions;
use super::state::Effect;
use super::views::{kind_keyboard, quality_keyboard, DefaultMenuView, MenuView};
use crate::download::{DownloadRequest, DownloadService};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, User};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

/// Display name for logs
#[must_use]
pub fn get_user_name(user: Option<&User>) -> String {
    if let Some(user) = user {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show usage
    #[command(description = "Show how to use the bot.")]
    Help,
}

/// Start command handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Start command received from user {user_id}.");
    send_message_resilient(&bot, msg.chat.id, DefaultMenuView::welcome_message(), None).await?;
    Ok(())
}

/// Help command handler
///
/// # Errors
///
/// Returns an error if the help message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    let text = DefaultMenuView::help_message(&Command::descriptions().to_string());
    send_message_resilient(&bot, msg.chat.id, text, None).await?;
    Ok(())
}

/// Whether a text goes to the link handler. Unknown `/commands` are
/// dropped instead of getting the "invalid link" reply.
#[must_use]
pub fn is_link_candidate(text: &str) -> bool {
    !text.starts_with('/')
}

/// Text message handler: open a menu for the first YouTube link
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_text(bot: Bot, msg: Message, sessions: MenuSessions) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let text = msg.text().unwrap_or_default();

    let Some(url) = extract_youtube_url(text) else {
        debug!(user_id, "Message without a YouTube link");
        send_message_resilient(&bot, msg.chat.id, DefaultMenuView::invalid_link(), None).await?;
        return Ok(());
    };

    let session_id = sessions.create(url.clone(), msg.chat.id.0, user_id).await;
    info!(
        user_id,
        user = %get_user_name(msg.from.as_ref()),
        %url,
        %session_id,
        "Link received"
    );
    send_message_resilient(
        &bot,
        msg.chat.id,
        DefaultMenuView::choose_kind(),
        Some(kind_keyboard(&session_id)),
    )
    .await?;
    Ok(())
}

/// Inline button handler: advance the menu and start jobs
///
/// # Errors
///
/// Returns an error if the callback query cannot be answered.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    sessions: MenuSessions,
    service: Arc<DownloadService>,
) -> Result<()> {
    let user_id = q.from.id.0.cast_signed();
    let parsed = q.data.as_deref().and_then(CallbackData::parse);
    let (Some(data), Some(menu)) = (parsed, q.message.as_ref()) else {
        warn!(user_id, data = ?q.data, "Unusable callback query");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let chat_id = menu.chat().id;
    let menu_id = menu.id();

    let advanced = match sessions.advance(&data.session_id, data.action).await {
        Ok(advanced) => advanced,
        Err(e) => {
            debug!(user_id, session_id = %data.session_id, reason = %e, "Button press rejected");
            bot.answer_callback_query(q.id.clone()).text(e.to_string()).await?;
            return Ok(());
        }
    };
    bot.answer_callback_query(q.id.clone()).await?;

    match advanced.effect {
        Effect::ShowQualities => {
            edit_message_safe_resilient(
                &bot,
                chat_id,
                menu_id,
                DefaultMenuView::choose_quality(),
                Some(quality_keyboard(&data.session_id)),
            )
            .await;
        }
        Effect::ShowKinds => {
            edit_message_safe_resilient(
                &bot,
                chat_id,
                menu_id,
                DefaultMenuView::choose_kind(),
                Some(kind_keyboard(&data.session_id)),
            )
            .await;
        }
        Effect::StartDownload(target) => {
            info!(user_id, session_id = %data.session_id, ?target, "Download requested");
            edit_message_safe_resilient(
                &bot,
                chat_id,
                menu_id,
                &DefaultMenuView::download_started(target),
                None,
            )
            .await;

            let job = DownloadJob {
                session_id: data.session_id,
                chat_id,
                status_message: menu_id,
                request: DownloadRequest {
                    url: advanced.session.url,
                    target,
                },
            };
            tokio::spawn(run_job(bot, service, sessions, job));
        }
    }
    Ok(())
}
