//! Telegram calls with automatic retry on transient network failures.
//!
//! # Usage
//!
//! ```ignore
//! use tubegrab_bot::bot::resilient::{send_message_resilient, edit_message_safe_resilient};
//!
//! let msg = send_message_resilient(&bot, chat_id, "Hello!", None).await?;
//! let edited = edit_message_safe_resilient(&bot, chat_id, msg.id, "Updated!").await;
//! ```

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, Message, MessageId};
use tracing::{debug, warn};

/// Telegram rejects texts above 4096 characters
const MAX_MESSAGE_CHARS: usize = 4096;

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_NOT_FOUND: &str = "message to edit not found";

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = fit_message(&text.into());
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(ref kb) = markup {
            req = req.reply_markup(kb.clone());
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message text, optionally replacing its inline keyboard.
///
/// Without `markup` the keyboard is removed.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = fit_message(&text.into());
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(ref kb) = markup {
            req = req.reply_markup(kb.clone());
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit a message, logging instead of failing.
///
/// "Not modified" and "not found" are expected (double presses, deleted
/// menus) and only logged at debug level.
///
/// Returns `true` if the message was edited.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> bool {
    match edit_message_resilient(bot, chat_id, msg_id, text, markup).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if is_benign_edit_error(&err_msg) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}

fn is_benign_edit_error(message: &str) -> bool {
    message.contains(ERROR_NOT_MODIFIED) || message.contains(ERROR_NOT_FOUND)
}

fn fit_message(text: &str) -> String {
    crate::utils::ellipsize(text, MAX_MESSAGE_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_edit_errors() {
        assert!(is_benign_edit_error(
            "Telegram edit error: Bad Request: message is not modified: specified new message content is the same"
        ));
        assert!(is_benign_edit_error("Bad Request: message to edit not found"));
        assert!(!is_benign_edit_error("Bad Request: chat not found"));
    }

    #[test]
    fn test_fit_message() {
        assert_eq!(fit_message("short"), "short");
        let long = "я".repeat(MAX_MESSAGE_CHARS + 10);
        assert_eq!(fit_message(&long).chars().count(), MAX_MESSAGE_CHARS);
    }
}
