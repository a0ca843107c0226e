//! Media download layer
//!
//! Everything between "the user picked an option" and "a file is on disk":
//! the typed request, the yt-dlp invocation, and the service that adds
//! concurrency limits, retries and cleanup around it.

pub mod error;
pub mod service;
pub mod tools;
pub mod ytdlp;

pub use error::DownloadError;
pub use service::DownloadService;
pub use ytdlp::{MediaDownloader, YtDlp};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Video quality offered on the quality keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    /// 1080p at 60 fps or more
    P1080F60,
    /// 1080p
    P1080,
    /// 720p at 60 fps or more
    P720F60,
    /// 720p
    P720,
    /// 480p
    P480,
    /// 360p
    P360,
}

impl Quality {
    /// Every quality in keyboard order
    pub const ALL: [Self; 6] = [
        Self::P1080F60,
        Self::P1080,
        Self::P720F60,
        Self::P720,
        Self::P480,
        Self::P360,
    ];

    /// Short identifier used in callback data and captions
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P1080F60 => "1080p60",
            Self::P1080 => "1080p",
            Self::P720F60 => "720p60",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
        }
    }

    /// Button label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::P1080F60 => "1080p 60fps",
            Self::P1080 => "1080p",
            Self::P720F60 => "720p 60fps",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
        }
    }

    /// yt-dlp `-f` selector
    #[must_use]
    pub const fn format_selector(self) -> &'static str {
        match self {
            Self::P1080F60 => "bestvideo[height=1080][fps>=60]+bestaudio/best",
            Self::P1080 => "bestvideo[height=1080]+bestaudio/best",
            Self::P720F60 => "bestvideo[height=720][fps>=60]+bestaudio/best",
            Self::P720 => "bestvideo[height=720]+bestaudio/best",
            Self::P480 => "bestvideo[height=480]+bestaudio/best",
            Self::P360 => "bestvideo[height=360]+bestaudio/best",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the enumerated qualities
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown quality: {0}")]
pub struct UnknownQuality(pub String);

impl FromStr for Quality {
    type Err = UnknownQuality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| UnknownQuality(s.to_string()))
    }
}

/// What the user wants out of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTarget {
    /// MP4 video at the given quality
    Video(Quality),
    /// MP3 audio track
    Audio,
}

impl MediaTarget {
    /// Fallback title when yt-dlp reports none
    #[must_use]
    pub const fn default_title(self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Audio => "audio",
        }
    }

    /// Noun used in user-facing messages
    #[must_use]
    pub const fn noun(self) -> &'static str {
        self.default_title()
    }
}

/// A single extraction job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Link as sent by the user, already normalized
    pub url: String,
    /// Requested output
    pub target: MediaTarget,
}

impl DownloadRequest {
    /// Video request
    #[must_use]
    pub fn video(url: impl Into<String>, quality: Quality) -> Self {
        Self {
            url: url.into(),
            target: MediaTarget::Video(quality),
        }
    }

    /// Audio request
    #[must_use]
    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: MediaTarget::Audio,
        }
    }
}

/// A finished download waiting to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    /// Local file
    pub path: PathBuf,
    /// Title reported by the extractor
    pub title: String,
    /// File size in bytes
    pub size_bytes: u64,
}

impl DownloadedMedia {
    /// File name component, used when uploading
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| "media".to_string(), |n| n.to_string_lossy().to_string())
    }
}
