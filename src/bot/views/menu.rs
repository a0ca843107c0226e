//! Download menu UI components
//!
//! Contains keyboards and text messages for the link menu.

use crate::bot::callback::CallbackData;
use crate::bot::state::MenuAction;
use crate::download::{MediaTarget, Quality};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for download menu text rendering
pub trait MenuView {
    /// Reply to `/start`
    fn welcome_message() -> &'static str;

    /// Reply to `/help`, `commands` is the generated command list
    fn help_message(commands: &str) -> String;

    /// Reply to text without a usable link
    fn invalid_link() -> &'static str;

    /// Prompt above the video / audio keyboard
    fn choose_kind() -> &'static str;

    /// Prompt above the quality keyboard
    fn choose_quality() -> &'static str;

    /// Status while a job runs
    fn download_started(target: MediaTarget) -> String;

    /// Caption on the delivered file
    fn caption(title: &str, target: MediaTarget) -> String;

    /// Status after delivery
    fn download_completed(title: &str, target: MediaTarget) -> String;

    /// Status after a failure
    fn download_failed(reason: &str, target: MediaTarget) -> String;

    /// Reply to users outside the allow-list
    fn access_denied() -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default English implementation of `MenuView`
pub struct DefaultMenuView;

impl MenuView for DefaultMenuView {
    fn welcome_message() -> &'static str {
        "Welcome to the YouTube Downloader Bot! Send me a YouTube link, and I'll give you download options."
    }

    fn help_message(commands: &str) -> String {
        format!(
            "{commands}\n\n\
            Send a YouTube link (youtube.com or youtu.be), then pick video or audio.\n\
            Video comes as MP4 in the quality you choose, audio as MP3."
        )
    }

    fn invalid_link() -> &'static str {
        "❌ Please send a valid YouTube link."
    }

    fn choose_kind() -> &'static str {
        "Choose the type of content to download:"
    }

    fn choose_quality() -> &'static str {
        "Select the video quality:"
    }

    fn download_started(target: MediaTarget) -> String {
        match target {
            MediaTarget::Video(q) => format!("🎥 Downloading video in {}... ⏳", q.as_str()),
            MediaTarget::Audio => "🎵 Audio download started... ⏳".to_string(),
        }
    }

    fn caption(title: &str, target: MediaTarget) -> String {
        match target {
            MediaTarget::Video(q) => format!("🎥 {title} - {}", q.as_str()),
            MediaTarget::Audio => format!("🎵 {title}"),
        }
    }

    fn download_completed(title: &str, target: MediaTarget) -> String {
        match target {
            MediaTarget::Video(_) => format!("✅ Download completed: {title}"),
            MediaTarget::Audio => format!("✅ Audio download completed: {title}"),
        }
    }

    fn download_failed(reason: &str, target: MediaTarget) -> String {
        format!("❌ Error downloading {}: {reason}", target.noun())
    }

    fn access_denied() -> &'static str {
        "⛔️ Access denied"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

fn button(label: &str, action: MenuAction, session_id: &str) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, CallbackData::new(action, session_id).encode())
}

/// Video / audio choice for a link menu, side by side
#[must_use]
pub fn kind_keyboard(session_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("🎥 Download Video (MP4)", MenuAction::Video, session_id),
        button("🎵 Download Audio (MP3)", MenuAction::Audio, session_id),
    ]])
}

/// Quality choice, two per row, with a back button at the bottom
#[must_use]
pub fn quality_keyboard(session_id: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Quality::ALL
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|q| button(q.label(), MenuAction::Quality(*q), session_id))
                .collect()
        })
        .collect();
    rows.push(vec![button("🔙 Back", MenuAction::Back, session_id)]);
    InlineKeyboardMarkup::new(rows)
}
