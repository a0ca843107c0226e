//! Inline keyboard callback data: `<action>:<session_id>`.
//!
//! Telegram caps callback data at 64 bytes, so buttons carry a short
//! session id instead of the link itself.

use super::state::MenuAction;
use crate::download::Quality;

const ACTION_VIDEO: &str = "video";
const ACTION_AUDIO: &str = "audio";
const ACTION_BACK: &str = "back";

/// Longest session id accepted from a button
pub const MAX_SESSION_ID_LEN: usize = 32;

/// Decoded callback data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackData {
    /// Pressed button
    pub action: MenuAction,
    /// Menu the button belongs to
    pub session_id: String,
}

impl CallbackData {
    /// Build callback data for `action` on `session_id`
    #[must_use]
    pub fn new(action: MenuAction, session_id: impl Into<String>) -> Self {
        Self {
            action,
            session_id: session_id.into(),
        }
    }

    /// Parse raw callback data. Anything malformed yields `None`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let (action, session_id) = data.split_once(':')?;
        if session_id.is_empty()
            || session_id.len() > MAX_SESSION_ID_LEN
            || !session_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        let action = match action {
            ACTION_VIDEO => MenuAction::Video,
            ACTION_AUDIO => MenuAction::Audio,
            ACTION_BACK => MenuAction::Back,
            other => MenuAction::Quality(other.parse::<Quality>().ok()?),
        };
        Some(Self::new(action, session_id))
    }

    /// Encode for an inline button
    #[must_use]
    pub fn encode(&self) -> String {
        let action = match self.action {
            MenuAction::Video => ACTION_VIDEO,
            MenuAction::Audio => ACTION_AUDIO,
            MenuAction::Back => ACTION_BACK,
            MenuAction::Quality(q) => q.as_str(),
        };
        format!("{action}:{}", self.session_id)
    }
}
