//! Per-link menu state machine.
//!
//! Each link a user sends gets its own menu. Button presses move the menu
//! through these states; everything that does not match a transition is
//! rejected with a reason the caller can show as a toast.

use crate::download::{MediaTarget, Quality};
use thiserror::Error;

/// Where a link's menu currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuState {
    /// Video / audio keyboard is shown
    ChoosingKind,
    /// Quality keyboard is shown
    ChoosingQuality,
    /// A download job is running
    Downloading(MediaTarget),
    /// The file was delivered
    Completed,
    /// The download or the upload failed
    Failed,
}

/// A button press decoded from callback data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    /// "Download Video"
    Video,
    /// "Download Audio"
    Audio,
    /// "Back" on the quality keyboard
    Back,
    /// A quality button
    Quality(Quality),
}

/// What the handler has to do after a successful transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Replace the keyboard with the quality choices
    ShowQualities,
    /// Replace the keyboard with the video / audio choice
    ShowKinds,
    /// Start a download job
    StartDownload(MediaTarget),
}

/// Why a button press was ignored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    /// A job for this link is still running
    #[error("already downloading")]
    Busy,
    /// The menu already produced a result
    #[error("send the link again")]
    Finished,
    /// The button belongs to a keyboard that is no longer shown
    #[error("menu out of date")]
    Stale,
}

/// Outcome of a finished download job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// File delivered
    Delivered,
    /// Something went wrong
    Failed,
}

impl MenuState {
    /// Apply `action`, returning the next state and the effect to perform.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when `action` is not valid in this state.
    pub const fn advance(self, action: MenuAction) -> Result<(Self, Effect), Rejection> {
        match (self, action) {
            (Self::ChoosingKind, MenuAction::Video) => {
                Ok((Self::ChoosingQuality, Effect::ShowQualities))
            }
            (Self::ChoosingKind, MenuAction::Audio) => Ok((
                Self::Downloading(MediaTarget::Audio),
                Effect::StartDownload(MediaTarget::Audio),
            )),
            (Self::ChoosingQuality, MenuAction::Quality(q)) => Ok((
                Self::Downloading(MediaTarget::Video(q)),
                Effect::StartDownload(MediaTarget::Video(q)),
            )),
            (Self::ChoosingQuality, MenuAction::Back) => Ok((Self::ChoosingKind, Effect::ShowKinds)),
            (Self::Downloading(_), _) => Err(Rejection::Busy),
            (Self::Completed | Self::Failed, _) => Err(Rejection::Finished),
            _ => Err(Rejection::Stale),
        }
    }

    /// State after a job ends. Only `Downloading` moves; other states are kept.
    #[must_use]
    pub const fn finish(self, outcome: Outcome) -> Self {
        match (self, outcome) {
            (Self::Downloading(_), Outcome::Delivered) => Self::Completed,
            (Self::Downloading(_), Outcome::Failed) => Self::Failed,
            (other, _) => other,
        }
    }

    /// Whether the menu has produced its result
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
